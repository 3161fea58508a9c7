use crate::emotion::Modality;
use crate::fusion::FusionStrategy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EuterpeConfig {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub fusion: FusionConfig,
}

impl EuterpeConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: EuterpeConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EUTERPE_SERVICE_URL") {
            self.service.base_url = v;
        }
        if let Ok(v) = std::env::var("EUTERPE_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.service.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("EUTERPE_CAPTURE_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.capture.interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("EUTERPE_FRAMES_DIR") {
            self.capture.frames_dir = Some(v);
        }
        if let Ok(v) = std::env::var("EUTERPE_CONFIDENCE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.fusion.confidence_threshold = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the prediction/recommendation service, without the
    /// `/api` prefix.
    pub base_url: String,
    /// Transport-level timeout for a single request, in seconds.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds between face captures while detection runs.
    pub interval_secs: u64,
    /// Directory of still frames for the directory-backed capture device.
    pub frames_dir: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            frames_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,
    /// Relative modality weights. Only ratios matter: the engine rescales
    /// over whichever modalities are present in a given tick. A `weights`
    /// table in the config file replaces the default set wholesale.
    pub weights: BTreeMap<Modality, f32>,
    /// Minimum fused confidence for an emotion change to retarget the music.
    pub confidence_threshold: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::Late,
            weights: default_weights(),
            confidence_threshold: 0.5,
        }
    }
}

impl FusionConfig {
    /// Weight assigned to a modality; 0.0 when unconfigured, negatives
    /// clamped out.
    pub fn weight(&self, modality: Modality) -> f32 {
        self.weights
            .get(&modality)
            .copied()
            .unwrap_or(0.0)
            .max(0.0)
    }
}

fn default_weights() -> BTreeMap<Modality, f32> {
    [
        (Modality::Face, 0.4),
        (Modality::Speech, 0.3),
        (Modality::Text, 0.3),
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = EuterpeConfig::default();
        assert_eq!(cfg.service.base_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.service.timeout_secs, 30);
        assert_eq!(cfg.capture.interval_secs, 3);
        assert!(cfg.capture.frames_dir.is_none());
        assert_eq!(cfg.fusion.strategy, FusionStrategy::Late);
        assert!((cfg.fusion.confidence_threshold - 0.5).abs() < 1e-6);
        assert!((cfg.fusion.weight(Modality::Face) - 0.4).abs() < 1e-6);
        assert!((cfg.fusion.weight(Modality::Speech) - 0.3).abs() < 1e-6);
        assert!((cfg.fusion.weight(Modality::Text) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[service]
base_url = "http://10.0.0.5:9000"
"#;
        let cfg: EuterpeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.service.base_url, "http://10.0.0.5:9000");
        // Defaults for unspecified fields
        assert_eq!(cfg.service.timeout_secs, 30);
        assert_eq!(cfg.capture.interval_secs, 3);
        assert!((cfg.fusion.weight(Modality::Face) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[service]
base_url = "http://emotion.local:8000"
timeout_secs = 10

[capture]
interval_secs = 5
frames_dir = "frames"

[fusion]
strategy = "late"
confidence_threshold = 0.65

[fusion.weights]
face = 0.5
speech = 0.2
text = 0.3
"#;
        let cfg: EuterpeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.service.timeout_secs, 10);
        assert_eq!(cfg.capture.interval_secs, 5);
        assert_eq!(cfg.capture.frames_dir.as_deref(), Some("frames"));
        assert!((cfg.fusion.confidence_threshold - 0.65).abs() < 1e-6);
        assert!((cfg.fusion.weight(Modality::Face) - 0.5).abs() < 1e-6);
        assert!((cfg.fusion.weight(Modality::Text) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_partial_weights_table_replaces_defaults() {
        let toml_str = r#"
[fusion.weights]
face = 1.0
"#;
        let cfg: EuterpeConfig = toml::from_str(toml_str).unwrap();
        assert!((cfg.fusion.weight(Modality::Face) - 1.0).abs() < 1e-6);
        // Unlisted modalities carry no weight once the table is given.
        assert_eq!(cfg.fusion.weight(Modality::Speech), 0.0);
        assert_eq!(cfg.fusion.weight(Modality::Text), 0.0);
    }

    #[test]
    fn test_negative_weight_clamped() {
        let toml_str = r#"
[fusion.weights]
face = -2.0
text = 0.5
"#;
        let cfg: EuterpeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.fusion.weight(Modality::Face), 0.0);
        assert!((cfg.fusion.weight(Modality::Text) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("EUTERPE_SERVICE_URL", "http://override:8000");
        std::env::set_var("EUTERPE_CAPTURE_INTERVAL_SECS", "7");

        let mut cfg = EuterpeConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.service.base_url, "http://override:8000");
        assert_eq!(cfg.capture.interval_secs, 7);

        // Clean up env vars before testing defaults
        std::env::remove_var("EUTERPE_SERVICE_URL");
        std::env::remove_var("EUTERPE_CAPTURE_INTERVAL_SECS");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = EuterpeConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.service.base_url, "http://127.0.0.1:8000");
    }
}
