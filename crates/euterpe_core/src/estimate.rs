//! Per-modality classifications and the fused per-tick estimate.

use crate::emotion::{Emotion, EmotionDistribution, Modality};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One modality's classification of a single capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityResult {
    pub modality: Modality,
    pub emotion: Emotion,
    /// Top-label confidence in `[0, 1]`.
    pub confidence: f32,
    /// Full per-label mass, when the service provided one.
    #[serde(default)]
    pub probabilities: Option<EmotionDistribution>,
}

impl ModalityResult {
    pub fn new(modality: Modality, emotion: Emotion, confidence: f32) -> Self {
        Self {
            modality,
            emotion,
            confidence: confidence.clamp(0.0, 1.0),
            probabilities: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: EmotionDistribution) -> Self {
        self.probabilities = Some(probabilities);
        self
    }

    /// The distribution this result contributes to fusion.
    ///
    /// When the service omitted a probability map, the confidence goes on the
    /// predicted label and the remainder is spread evenly across the other
    /// labels. For coherent inputs (confidence at least the uniform share)
    /// the synthesized distribution keeps its argmax on the predicted label.
    pub fn distribution(&self) -> EmotionDistribution {
        match &self.probabilities {
            Some(p) => p.normalized(),
            None => {
                let confidence = if self.confidence.is_finite() {
                    self.confidence.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let rest = (1.0 - confidence) / (Emotion::ALL.len() - 1) as f32;
                Emotion::ALL
                    .iter()
                    .map(|&e| (e, if e == self.emotion { confidence } else { rest }))
                    .collect()
            }
        }
    }
}

/// The loop's synthesized view of the listener's emotional state at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    pub emotion: Emotion,
    /// Mass on the winning label after fusion, in `[0, 1]`.
    pub confidence: f32,
    pub probabilities: EmotionDistribution,
    /// Confidence each contributing modality reported for its own top label.
    pub per_modality: BTreeMap<Modality, f32>,
    pub produced_at: DateTime<Utc>,
}

impl FusedEstimate {
    /// Which modalities contributed to this estimate.
    pub fn modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        self.per_modality.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_passes_through_service_map() {
        let probs: EmotionDistribution = [
            (Emotion::Happy, 0.6),
            (Emotion::Sad, 0.1),
            (Emotion::Neutral, 0.3),
        ]
        .into_iter()
        .collect();
        let result = ModalityResult::new(Modality::Face, Emotion::Happy, 0.6)
            .with_probabilities(probs.clone());
        let dist = result.distribution();
        assert!((dist.get(Emotion::Happy) - 0.6).abs() < 1e-6);
        assert!((dist.total() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_distribution_renormalizes_sloppy_map() {
        // Service rounding can leave the mass slightly off unit.
        let probs: EmotionDistribution = [(Emotion::Calm, 0.5), (Emotion::Neutral, 0.6)]
            .into_iter()
            .collect();
        let result = ModalityResult::new(Modality::Text, Emotion::Neutral, 0.6)
            .with_probabilities(probs);
        let dist = result.distribution();
        assert!((dist.total() - 1.0).abs() < 1e-5);
        assert!(dist.get(Emotion::Neutral) > dist.get(Emotion::Calm));
    }

    #[test]
    fn test_distribution_synthesized_when_map_absent() {
        let result = ModalityResult::new(Modality::Face, Emotion::Angry, 0.8);
        let dist = result.distribution();
        assert!((dist.get(Emotion::Angry) - 0.8).abs() < 1e-6);
        // Remaining 0.2 spread over the other five labels.
        assert!((dist.get(Emotion::Happy) - 0.04).abs() < 1e-6);
        assert!((dist.total() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_confidence_clamped_on_construction() {
        let result = ModalityResult::new(Modality::Speech, Emotion::Calm, 1.7);
        assert_eq!(result.confidence, 1.0);
        let result = ModalityResult::new(Modality::Speech, Emotion::Calm, -0.3);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_fused_estimate_serde_roundtrip() {
        let estimate = FusedEstimate {
            emotion: Emotion::Happy,
            confidence: 0.71,
            probabilities: EmotionDistribution::uniform(),
            per_modality: [(Modality::Face, 0.8), (Modality::Text, 0.5)]
                .into_iter()
                .collect(),
            produced_at: Utc::now(),
        };
        let json = serde_json::to_string(&estimate).unwrap();
        let back: FusedEstimate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.emotion, Emotion::Happy);
        assert_eq!(back.per_modality.len(), 2);
        assert_eq!(back.modalities().collect::<Vec<_>>(), vec![
            Modality::Face,
            Modality::Text
        ]);
    }
}
