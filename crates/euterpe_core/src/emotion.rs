//! Emotion vocabulary shared across the whole pipeline.
//!
//! The prediction service, the fusion engine and the recommendation flow all
//! speak the same closed set of six lowercase labels. Probability mass over
//! that set travels as an [`EmotionDistribution`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The closed emotion vocabulary.
///
/// Labels serialize to their lowercase wire form (`"happy"`, `"sad"`, ...),
/// which is exactly what the prediction service emits and the recommendation
/// endpoint accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Calm,
    #[default]
    Neutral,
    Excited,
}

impl Emotion {
    /// Every label, in canonical order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Calm,
        Emotion::Neutral,
        Emotion::Excited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Calm => "calm",
            Emotion::Neutral => "neutral",
            Emotion::Excited => "excited",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An input channel the prediction service can classify.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Face,
    Speech,
    Text,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Face, Modality::Speech, Modality::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Face => "face",
            Modality::Speech => "speech",
            Modality::Text => "text",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability mass over the emotion vocabulary.
///
/// Missing labels read as 0.0. Values are kept as received; call
/// [`EmotionDistribution::normalized`] to rescale to unit mass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionDistribution(BTreeMap<Emotion, f32>);

impl EmotionDistribution {
    /// Equal mass on every label.
    pub fn uniform() -> Self {
        let share = 1.0 / Emotion::ALL.len() as f32;
        Emotion::ALL.iter().map(|&e| (e, share)).collect()
    }

    /// All mass on a single label.
    pub fn point(emotion: Emotion) -> Self {
        let mut dist = Self::default();
        dist.set(emotion, 1.0);
        dist
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        self.0.get(&emotion).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, emotion: Emotion, mass: f32) {
        self.0.insert(emotion, mass);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        self.0.iter().map(|(&e, &p)| (e, p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total probability mass. Non-finite entries count as zero.
    pub fn total(&self) -> f32 {
        self.0.values().copied().filter(|p| p.is_finite()).sum()
    }

    /// Rescale to unit mass. A distribution with no usable mass becomes
    /// uniform rather than dividing by zero.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= f32::EPSILON {
            return Self::uniform();
        }
        self.0
            .iter()
            .map(|(&e, &p)| (e, if p.is_finite() { p / total } else { 0.0 }))
            .collect()
    }
}

impl FromIterator<(Emotion, f32)> for EmotionDistribution {
    fn from_iter<I: IntoIterator<Item = (Emotion, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_wire_labels() {
        for emotion in Emotion::ALL {
            let json = serde_json::to_string(&emotion).unwrap();
            assert_eq!(json, format!("\"{}\"", emotion.as_str()));
            let back: Emotion = serde_json::from_str(&json).unwrap();
            assert_eq!(back, emotion);
        }
    }

    #[test]
    fn test_emotion_default_is_neutral() {
        assert_eq!(Emotion::default(), Emotion::Neutral);
    }

    #[test]
    fn test_unknown_label_rejected() {
        let result: Result<Emotion, _> = serde_json::from_str("\"confused\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_modality_wire_labels() {
        assert_eq!(
            serde_json::to_string(&Modality::Face).unwrap(),
            "\"face\""
        );
        let back: Modality = serde_json::from_str("\"speech\"").unwrap();
        assert_eq!(back, Modality::Speech);
    }

    #[test]
    fn test_distribution_decodes_service_map() {
        let json = r#"{
            "happy": 0.62,
            "sad": 0.05,
            "angry": 0.03,
            "calm": 0.1,
            "neutral": 0.15,
            "excited": 0.05
        }"#;
        let dist: EmotionDistribution = serde_json::from_str(json).unwrap();
        assert_eq!(dist.len(), 6);
        assert!((dist.get(Emotion::Happy) - 0.62).abs() < 1e-6);
        assert!((dist.total() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_missing_label_reads_zero() {
        let dist = EmotionDistribution::point(Emotion::Sad);
        assert_eq!(dist.get(Emotion::Happy), 0.0);
        assert_eq!(dist.get(Emotion::Sad), 1.0);
    }

    #[test]
    fn test_uniform_sums_to_one() {
        let dist = EmotionDistribution::uniform();
        assert_eq!(dist.len(), 6);
        assert!((dist.total() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_rescales() {
        let dist: EmotionDistribution = [(Emotion::Happy, 2.0), (Emotion::Sad, 2.0)]
            .into_iter()
            .collect();
        let norm = dist.normalized();
        assert!((norm.get(Emotion::Happy) - 0.5).abs() < 1e-6);
        assert!((norm.get(Emotion::Sad) - 0.5).abs() < 1e-6);
        assert!((norm.total() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_zero_mass_becomes_uniform() {
        let dist: EmotionDistribution = [(Emotion::Happy, 0.0)].into_iter().collect();
        let norm = dist.normalized();
        assert_eq!(norm, EmotionDistribution::uniform());
    }

    #[test]
    fn test_normalized_ignores_non_finite_mass() {
        let dist: EmotionDistribution = [
            (Emotion::Happy, f32::NAN),
            (Emotion::Sad, 0.5),
            (Emotion::Calm, 0.5),
        ]
        .into_iter()
        .collect();
        let norm = dist.normalized();
        assert_eq!(norm.get(Emotion::Happy), 0.0);
        assert!((norm.get(Emotion::Sad) - 0.5).abs() < 1e-6);
        assert!(norm.total().is_finite());
    }
}
