//! Late fusion of per-modality emotion classifications.
//!
//! Each available modality contributes its probability distribution, scaled
//! by a configured weight:
//!
//! ```text
//! combined[label] = Σ_m  w_m / Σw  ·  p_m[label]
//! ```
//!
//! Weights are renormalized over the modalities actually present, so a
//! missing channel redistributes its influence to the rest instead of
//! deflating everyone's confidence. The fused label is the argmax of the
//! combined distribution; exact ties go to the previous tick's label when it
//! is among the tied set, otherwise to the lexicographically smallest label,
//! so repeated fusion of the same inputs can never oscillate.

use crate::config::FusionConfig;
use crate::emotion::{Emotion, EmotionDistribution, Modality};
use crate::estimate::{FusedEstimate, ModalityResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// How per-modality results are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Classify each modality independently, then mix the resulting
    /// probability distributions.
    #[default]
    Late,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FusionError {
    /// Fusing an empty modality set is a programming error upstream, not a
    /// runtime condition; debug builds assert instead.
    #[error("no modality results to fuse")]
    NoModalities,
}

/// Weighted late-fusion engine.
///
/// Holds the fusion section of the config; the engine itself is stateless,
/// so one instance serves a whole session.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse every present modality into one estimate.
    ///
    /// `previous` is the label of the preceding fused estimate; it wins
    /// exact ties so the reading does not flap between equally likely
    /// labels across consecutive ticks.
    pub fn fuse(
        &self,
        results: &BTreeMap<Modality, ModalityResult>,
        previous: Option<Emotion>,
    ) -> Result<FusedEstimate, FusionError> {
        debug_assert!(
            !results.is_empty(),
            "fuse() requires at least one modality result"
        );
        if results.is_empty() {
            return Err(FusionError::NoModalities);
        }

        // === Weight renormalization over present modalities ===
        let mut weights: BTreeMap<Modality, f32> = results
            .keys()
            .map(|&m| (m, self.config.weight(m)))
            .collect();
        let total: f32 = weights.values().sum();
        if total <= f32::EPSILON {
            // Every present modality is configured to zero weight; treat
            // them as equal rather than dividing by zero.
            let share = 1.0 / weights.len() as f32;
            for w in weights.values_mut() {
                *w = share;
            }
        } else {
            for w in weights.values_mut() {
                *w /= total;
            }
        }

        // === Weighted mixture of the per-modality distributions ===
        let mut combined = EmotionDistribution::default();
        for (&modality, result) in results {
            let weight = weights[&modality];
            for (emotion, mass) in result.distribution().iter() {
                combined.set(emotion, combined.get(emotion) + weight * mass);
            }
        }

        // === Argmax with deterministic tie-breaking ===
        let (emotion, confidence) = argmax(&combined, previous);

        let per_modality = results.iter().map(|(&m, r)| (m, r.confidence)).collect();

        Ok(FusedEstimate {
            emotion,
            confidence,
            probabilities: combined,
            per_modality,
            produced_at: chrono::Utc::now(),
        })
    }
}

/// Highest-mass label; exact ties go to `previous` when it is tied,
/// otherwise to the lexicographically smallest tied label.
fn argmax(distribution: &EmotionDistribution, previous: Option<Emotion>) -> (Emotion, f32) {
    let mut best = f32::NEG_INFINITY;
    for (_, mass) in distribution.iter() {
        if mass > best {
            best = mass;
        }
    }
    if !best.is_finite() {
        return (Emotion::default(), 0.0);
    }

    let tied: Vec<Emotion> = distribution
        .iter()
        .filter(|&(_, mass)| mass == best)
        .map(|(e, _)| e)
        .collect();

    let winner = match previous {
        Some(prev) if tied.contains(&prev) => prev,
        _ => tied
            .into_iter()
            .min_by_key(|e| e.as_str())
            .unwrap_or_default(),
    };
    (winner, best)
}
