//! # Euterpe Core
//!
//! Shared vocabulary and pure logic for the Euterpe listening loop:
//!
//! - [`emotion`]: the closed label set and probability distributions over it
//! - [`estimate`]: per-modality classifications and the fused per-tick estimate
//! - [`fusion`]: the weighted late-fusion engine
//! - [`track`]: recommended tracks and listener feedback
//! - [`config`]: TOML configuration with environment overrides
//!
//! Everything in this crate is synchronous and IO-free. The async session
//! machinery lives in `euterpe_session`, the HTTP surface in `euterpe_client`.

pub mod config;
pub mod emotion;
pub mod estimate;
pub mod fusion;
pub mod track;

pub use config::{CaptureConfig, EuterpeConfig, FusionConfig, ServiceConfig};
pub use emotion::{Emotion, EmotionDistribution, Modality};
pub use estimate::{FusedEstimate, ModalityResult};
pub use fusion::{FusionEngine, FusionError, FusionStrategy};
pub use track::{FeedbackRating, Recommendation};
