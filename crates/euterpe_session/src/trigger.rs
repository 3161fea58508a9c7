//! Recommendation trigger: decides when the music should follow the mood.
//!
//! A two-phase hysteresis machine. STABLE watches fused estimates; a
//! sufficiently confident change of label starts a recommendation request
//! and enters SEEKING. SEEKING waits for that request to resolve and ignores
//! everything else, so at most one recommendation request is outstanding at
//! any time. The transition function is pure: callers feed it events and
//! issue whatever request it hands back.

use euterpe_core::Emotion;

/// Observable phase of the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPhase {
    #[default]
    Stable,
    /// A recommendation request is in flight.
    Seeking,
}

/// A recommendation request the session should issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendRequest {
    pub emotion: Emotion,
    /// Track to steer away from, when one is currently playing.
    pub exclude: Option<String>,
}

/// Events the trigger reacts to.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// A fused estimate arrived from a detection tick.
    Estimate { emotion: Emotion, confidence: f32 },
    /// The listener explicitly asked for different music. Bypasses the
    /// confidence rule.
    Force { emotion: Emotion },
    /// The outstanding request resolved with a track.
    Resolved {
        emotion: Emotion,
        recommendation_id: String,
    },
    /// The outstanding request failed. The trigger stands down so a later
    /// tick can retry.
    Failed,
}

/// State guarding recommendation requests.
///
/// `last_emotion` starts at the neutral default, so the very first estimate
/// is held to the same confidence rule as any later change.
#[derive(Debug, Clone)]
pub struct RecommendationTrigger {
    phase: TriggerPhase,
    /// Label the current music was matched to.
    last_emotion: Emotion,
    /// Identifier of the recommendation currently playing.
    last_recommendation_id: Option<String>,
    confidence_threshold: f32,
}

impl RecommendationTrigger {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            phase: TriggerPhase::Stable,
            last_emotion: Emotion::default(),
            last_recommendation_id: None,
            confidence_threshold,
        }
    }

    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    pub fn last_emotion(&self) -> Emotion {
        self.last_emotion
    }

    pub fn last_recommendation_id(&self) -> Option<&str> {
        self.last_recommendation_id.as_deref()
    }

    /// Advance the machine, returning the request the caller should issue
    /// if this event starts one.
    pub fn apply(&mut self, event: TriggerEvent) -> Option<RecommendRequest> {
        match (self.phase, event) {
            (TriggerPhase::Stable, TriggerEvent::Estimate { emotion, confidence }) => {
                if emotion == self.last_emotion {
                    return None;
                }
                if confidence < self.confidence_threshold {
                    tracing::debug!(
                        %emotion,
                        confidence,
                        threshold = self.confidence_threshold,
                        "emotion changed below threshold, holding"
                    );
                    return None;
                }
                self.seek(emotion)
            }
            (TriggerPhase::Stable, TriggerEvent::Force { emotion }) => self.seek(emotion),
            // Resolutions arriving while STABLE belong to an abandoned
            // request; drop them.
            (TriggerPhase::Stable, TriggerEvent::Resolved { .. })
            | (TriggerPhase::Stable, TriggerEvent::Failed) => None,

            // Backpressure: one outstanding request at a time.
            (TriggerPhase::Seeking, TriggerEvent::Estimate { .. })
            | (TriggerPhase::Seeking, TriggerEvent::Force { .. }) => None,
            (
                TriggerPhase::Seeking,
                TriggerEvent::Resolved {
                    emotion,
                    recommendation_id,
                },
            ) => {
                self.phase = TriggerPhase::Stable;
                self.last_emotion = emotion;
                self.last_recommendation_id = Some(recommendation_id);
                None
            }
            (TriggerPhase::Seeking, TriggerEvent::Failed) => {
                self.phase = TriggerPhase::Stable;
                None
            }
        }
    }

    /// Forget an in-flight request whose result will never be applied
    /// (detection stopped). The matched label and track are kept.
    pub fn abandon_in_flight(&mut self) {
        if self.phase == TriggerPhase::Seeking {
            tracing::debug!("abandoning in-flight recommendation request");
            self.phase = TriggerPhase::Stable;
        }
    }

    fn seek(&mut self, emotion: Emotion) -> Option<RecommendRequest> {
        self.phase = TriggerPhase::Seeking;
        Some(RecommendRequest {
            emotion,
            exclude: self.last_recommendation_id.clone(),
        })
    }
}
