//! Append-only record of fused estimates for the session timeline.

use chrono::{DateTime, Utc};
use euterpe_core::{Emotion, FusedEstimate};
use serde::Serialize;
use std::collections::BTreeMap;

/// One fused estimate frozen into the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub estimate: FusedEstimate,
}

/// Aggregate view over a session's timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub entries: usize,
    /// How many ticks landed on each label.
    pub counts: BTreeMap<Emotion, usize>,
    pub mean_confidence: f32,
    /// Most frequent label; count ties break to the lexicographically
    /// earliest label.
    pub dominant: Option<Emotion>,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
}

/// The ordered sequence of estimates produced so far.
///
/// Never deduplicated: a tick whose label matches the previous one still
/// appends, so the timeline shows confidence drift and not just label
/// changes. Entries are never reordered or dropped for the life of the
/// session.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one estimate. A timestamp that would run backwards (clock
    /// adjustment between ticks) is clamped to the previous entry's, keeping
    /// the sequence non-decreasing.
    pub fn append(&mut self, estimate: FusedEstimate) {
        let mut at = estimate.produced_at;
        if let Some(previous) = self.entries.last() {
            if at < previous.at {
                at = previous.at;
            }
        }
        self.entries.push(HistoryEntry { at, estimate });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// The full timeline, cloned out so callers can never reach the live
    /// entries.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    pub fn summary(&self) -> HistorySummary {
        let mut counts: BTreeMap<Emotion, usize> = BTreeMap::new();
        let mut confidence_sum = 0.0f32;
        for entry in &self.entries {
            *counts.entry(entry.estimate.emotion).or_insert(0) += 1;
            confidence_sum += entry.estimate.confidence;
        }
        let mean_confidence = if self.entries.is_empty() {
            0.0
        } else {
            confidence_sum / self.entries.len() as f32
        };
        let dominant = counts
            .iter()
            .map(|(&emotion, &count)| (emotion, count))
            .max_by(|a, b| {
                a.1.cmp(&b.1)
                    .then_with(|| b.0.as_str().cmp(a.0.as_str()))
            })
            .map(|(emotion, _)| emotion);
        HistorySummary {
            entries: self.entries.len(),
            counts,
            mean_confidence,
            dominant,
            first_at: self.entries.first().map(|e| e.at),
            last_at: self.entries.last().map(|e| e.at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use euterpe_core::EmotionDistribution;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn estimate(emotion: Emotion, confidence: f32, produced_at: DateTime<Utc>) -> FusedEstimate {
        FusedEstimate {
            emotion,
            confidence,
            probabilities: EmotionDistribution::point(emotion),
            per_modality: BTreeMap::new(),
            produced_at,
        }
    }

    #[test]
    fn test_every_tick_appends_even_when_label_repeats() {
        let mut log = HistoryLog::new();
        for i in 0..4 {
            log.append(estimate(Emotion::Calm, 0.7, at(i)));
        }
        assert_eq!(log.len(), 4);
        assert!(log
            .snapshot()
            .iter()
            .all(|e| e.estimate.emotion == Emotion::Calm));
    }

    #[test]
    fn test_backwards_timestamp_is_clamped() {
        let mut log = HistoryLog::new();
        log.append(estimate(Emotion::Happy, 0.8, at(10)));
        log.append(estimate(Emotion::Sad, 0.6, at(4)));
        log.append(estimate(Emotion::Sad, 0.6, at(12)));

        let snapshot = log.snapshot();
        assert_eq!(snapshot[1].at, at(10), "clamped to the previous entry");
        assert_eq!(snapshot[2].at, at(12));
        assert!(snapshot.windows(2).all(|w| w[0].at <= w[1].at));
    }

    #[test]
    fn test_snapshot_is_detached_from_the_log() {
        let mut log = HistoryLog::new();
        log.append(estimate(Emotion::Happy, 0.8, at(0)));
        let mut snapshot = log.snapshot();
        snapshot.clear();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_summary_counts_and_mean() {
        let mut log = HistoryLog::new();
        log.append(estimate(Emotion::Happy, 0.8, at(0)));
        log.append(estimate(Emotion::Happy, 0.6, at(3)));
        log.append(estimate(Emotion::Sad, 0.4, at(6)));

        let summary = log.summary();
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.counts[&Emotion::Happy], 2);
        assert_eq!(summary.counts[&Emotion::Sad], 1);
        assert!((summary.mean_confidence - 0.6).abs() < 1e-6);
        assert_eq!(summary.dominant, Some(Emotion::Happy));
        assert_eq!(summary.first_at, Some(at(0)));
        assert_eq!(summary.last_at, Some(at(6)));
    }

    #[test]
    fn test_summary_dominant_tie_breaks_lexicographically() {
        let mut log = HistoryLog::new();
        log.append(estimate(Emotion::Sad, 0.5, at(0)));
        log.append(estimate(Emotion::Angry, 0.5, at(3)));
        // "angry" < "sad"
        assert_eq!(log.summary().dominant, Some(Emotion::Angry));
    }

    #[test]
    fn test_empty_summary() {
        let summary = HistoryLog::new().summary();
        assert_eq!(summary.entries, 0);
        assert_eq!(summary.mean_confidence, 0.0);
        assert_eq!(summary.dominant, None);
        assert_eq!(summary.first_at, None);
    }
}
