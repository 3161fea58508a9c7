//! # Euterpe Client
//!
//! Typed async client for the emotion prediction / music recommendation
//! service. Every route lives under the service's `/api` prefix:
//!
//! | Route | Wrapper |
//! |---|---|
//! | `POST /api/predict/face` | [`EmotionService::predict_face`] |
//! | `POST /api/predict/speech` | [`ApiClient::predict_speech`] |
//! | `POST /api/predict/text` | [`EmotionService::predict_text`] |
//! | `POST /api/fuse` | [`ApiClient::fuse_remote`] |
//! | `POST /api/recommend` | [`EmotionService::recommend`] |
//! | `POST /api/feedback` | [`EmotionService::log_feedback`] |
//! | `GET /api/playlist/stats` | [`ApiClient::playlist_stats`] |
//! | `POST /api/setup/fetch-playlist` | [`ApiClient::sync_catalog`] |
//! | `GET /api/health` | [`ApiClient::health`] |
//!
//! The session loop consumes the narrower [`EmotionService`] trait so tests
//! can substitute a scripted service.

pub mod api_types;
pub mod client;
pub mod error;

pub use api_types::{
    CatalogStats, FeedbackAck, FeedbackRequest, FuseResponse, HealthReport, Prediction,
    SyncReport,
};
pub use client::{ApiClient, EmotionService};
pub use error::ClientError;
