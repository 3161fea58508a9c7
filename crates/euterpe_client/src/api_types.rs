//! Wire types for the prediction/recommendation service.
//!
//! Shapes mirror the service's JSON exactly; domain conversions happen at
//! the edges (`Prediction::into_result`).

use chrono::{DateTime, Utc};
use euterpe_core::{
    Emotion, EmotionDistribution, FeedbackRating, FusionStrategy, Modality, ModalityResult,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FacePredictRequest {
    /// Base64-encoded still frame.
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeechPredictRequest {
    /// Base64-encoded PCM audio.
    pub audio: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPredictRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FuseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Prediction>,
    pub strategy: FusionStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<Modality, f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendRequest {
    pub emotion: Emotion,
    /// Track to steer away from, usually the one currently playing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_song_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    pub song_id: String,
    /// Fused emotion the track was recommended for.
    pub emotion: Emotion,
    pub emotion_confidence: f32,
    pub rating: FeedbackRating,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Responses
// ============================================================================

/// A single classification, as every `/api/predict/*` route returns it.
/// Also the per-modality payload of a remote fuse request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub emotion: Emotion,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<EmotionDistribution>,
}

impl Prediction {
    /// Tag a wire prediction with the modality it was requested for.
    pub fn into_result(self, modality: Modality) -> ModalityResult {
        ModalityResult {
            modality,
            emotion: self.emotion,
            confidence: self.confidence.clamp(0.0, 1.0),
            probabilities: self.probabilities,
        }
    }

    pub fn from_result(result: &ModalityResult) -> Self {
        Self {
            emotion: result.emotion,
            confidence: result.confidence,
            probabilities: result.probabilities.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuseResponse {
    pub emotion_fused: Emotion,
    pub confidence: f32,
    pub probabilities: EmotionDistribution,
    #[serde(default)]
    pub modalities_used: Vec<Modality>,
    #[serde(default)]
    pub weights: BTreeMap<Modality, f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackAck {
    pub status: String,
}

/// Catalog-wide statistics. The numeric aggregates are only meaningful when
/// `cached` is true; an unsynced service reports `cached: false` and omits
/// the audio-feature fields.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogStats {
    #[serde(default)]
    pub total_songs: u64,
    #[serde(default)]
    pub total_duration_hours: f32,
    #[serde(default)]
    pub average_valence: f32,
    #[serde(default)]
    pub average_energy: f32,
    #[serde(default)]
    pub average_tempo: Option<f32>,
    #[serde(default)]
    pub mood_distribution: BTreeMap<Emotion, u64>,
    pub cached: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncReport {
    pub status: String,
    #[serde(default)]
    pub songs_cached: Option<u64>,
    #[serde(default)]
    pub duration_hours: Option<f32>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SyncReport {
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

/// `/api/health` readiness summary. The service collapses its detectors into
/// one `models_loaded` flag and reports `spotify_playlist_loaded` as `null`
/// (not `false`) when the catalog handler never came up.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub models_loaded: bool,
    #[serde(
        rename = "spotify_playlist_loaded",
        default,
        deserialize_with = "null_as_false"
    )]
    pub catalog_loaded: bool,
}

/// FastAPI-style error body: `{"detail": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
