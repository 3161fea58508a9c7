//! Detection session orchestration.
//!
//! One running session wires four pieces together:
//!
//! - [`capture`]: the capture device seam and the fixed-cadence frame task
//! - [`trigger`]: the hysteresis machine guarding recommendation requests
//! - [`history`]: the append-only timeline of fused estimates
//! - [`session`]: the actor loop that owns all mutable state and exposes
//!   a cloneable [`SessionHandle`]
//!
//! Start a session with [`SessionController::new`] plus
//! [`SessionController::spawn`], then drive it through the handle.

pub mod capture;
pub mod history;
pub mod session;
pub mod trigger;

pub use capture::{CaptureDevice, CaptureUpdate, FrameDirectory, Sample};
pub use history::{HistoryEntry, HistoryLog, HistorySummary};
pub use session::{SessionController, SessionHandle, SessionNotice};
pub use trigger::{RecommendRequest, RecommendationTrigger, TriggerEvent, TriggerPhase};
