use crate::api_types::{
    CatalogStats, ErrorBody, FacePredictRequest, FeedbackAck, FeedbackRequest, FuseRequest,
    FuseResponse, HealthReport, Prediction, RecommendRequest, SpeechPredictRequest, SyncReport,
    TextPredictRequest,
};
use crate::error::ClientError;
use async_trait::async_trait;
use euterpe_core::{
    Emotion, FusionStrategy, Modality, ModalityResult, Recommendation, ServiceConfig,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Operations the session loop consumes from the prediction service.
///
/// The production implementation is [`ApiClient`]; tests substitute a
/// scripted service.
#[async_trait]
pub trait EmotionService: Send + Sync {
    async fn predict_face(&self, image_base64: &str) -> Result<ModalityResult, ClientError>;

    async fn predict_text(&self, text: &str) -> Result<ModalityResult, ClientError>;

    /// Ask for a track matching `emotion`, steering away from
    /// `current_song_id` when given.
    async fn recommend(
        &self,
        emotion: Emotion,
        current_song_id: Option<&str>,
    ) -> Result<Recommendation, ClientError>;

    async fn log_feedback(&self, feedback: &FeedbackRequest) -> Result<FeedbackAck, ClientError>;
}

/// HTTP client for the prediction/recommendation service.
///
/// Cheap to clone. The transport timeout is fixed at construction, so a hung
/// service resolves into a [`ClientError::Transport`] instead of wedging the
/// caller forever.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::read(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::read(response).await
    }

    async fn read<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ClientError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                message: error_detail(&text),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Classify a clip of speech audio.
    #[tracing::instrument(skip(self, audio_base64))]
    pub async fn predict_speech(
        &self,
        audio_base64: &str,
        sample_rate: u32,
    ) -> Result<ModalityResult, ClientError> {
        let request = SpeechPredictRequest {
            audio: audio_base64.to_string(),
            sample_rate,
        };
        let prediction: Prediction = self.post("predict/speech", &request).await?;
        Ok(prediction.into_result(Modality::Speech))
    }

    /// Ask the service itself to fuse a set of predictions. The session
    /// fuses locally; this exists for parity checks against the service.
    pub async fn fuse_remote(
        &self,
        inputs: &BTreeMap<Modality, ModalityResult>,
        weights: Option<&BTreeMap<Modality, f32>>,
    ) -> Result<FuseResponse, ClientError> {
        let pick = |m: Modality| inputs.get(&m).map(Prediction::from_result);
        let request = FuseRequest {
            face: pick(Modality::Face),
            speech: pick(Modality::Speech),
            text: pick(Modality::Text),
            strategy: FusionStrategy::Late,
            weights: weights.cloned(),
        };
        self.post("fuse", &request).await
    }

    pub async fn playlist_stats(&self) -> Result<CatalogStats, ClientError> {
        self.get("playlist/stats").await
    }

    /// Pull the configured playlist into the service's catalog cache.
    #[tracing::instrument(skip(self))]
    pub async fn sync_catalog(&self) -> Result<SyncReport, ClientError> {
        let report: SyncReport = self
            .post("setup/fetch-playlist", &serde_json::json!({}))
            .await?;
        if report.is_error() {
            let message = report
                .message
                .unwrap_or_else(|| "no detail given".to_string());
            return Err(ClientError::SyncFailed(message));
        }
        tracing::info!(songs = ?report.songs_cached, "catalog synced");
        Ok(report)
    }

    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        self.get("health").await
    }
}

#[async_trait]
impl EmotionService for ApiClient {
    #[tracing::instrument(skip(self, image_base64))]
    async fn predict_face(&self, image_base64: &str) -> Result<ModalityResult, ClientError> {
        let request = FacePredictRequest {
            image: image_base64.to_string(),
        };
        let prediction: Prediction = self.post("predict/face", &request).await?;
        Ok(prediction.into_result(Modality::Face))
    }

    #[tracing::instrument(skip(self, text))]
    async fn predict_text(&self, text: &str) -> Result<ModalityResult, ClientError> {
        let request = TextPredictRequest {
            text: text.to_string(),
        };
        let prediction: Prediction = self.post("predict/text", &request).await?;
        Ok(prediction.into_result(Modality::Text))
    }

    #[tracing::instrument(skip(self))]
    async fn recommend(
        &self,
        emotion: Emotion,
        current_song_id: Option<&str>,
    ) -> Result<Recommendation, ClientError> {
        let request = RecommendRequest {
            emotion,
            current_song_id: current_song_id.map(str::to_string),
        };
        self.post("recommend", &request)
            .await
            .map_err(catalog_gate)
    }

    async fn log_feedback(&self, feedback: &FeedbackRequest) -> Result<FeedbackAck, ClientError> {
        self.post("feedback", feedback).await
    }
}

/// The service reports an unsynced catalog as a 404 on `/api/recommend`.
fn catalog_gate(error: ClientError) -> ClientError {
    match error {
        ClientError::Status {
            status: StatusCode::NOT_FOUND,
            ..
        } => ClientError::CatalogNotReady,
        other => other,
    }
}

/// Best-effort extraction of the FastAPI `detail` field; falls back to the
/// raw body, truncated so a stray HTML error page doesn't flood the logs.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.detail,
        Err(_) => {
            let trimmed = body.trim();
            let mut message: String = trimmed.chars().take(200).collect();
            if trimmed.chars().count() > 200 {
                message.push_str("...");
            }
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        let config = ServiceConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
        };
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn test_url_joins_under_api_prefix() {
        let api = client("http://localhost:8000");
        assert_eq!(
            api.url("predict/face"),
            "http://localhost:8000/api/predict/face"
        );
    }

    #[test]
    fn test_url_tolerates_trailing_slash() {
        let api = client("http://localhost:8000/");
        assert_eq!(api.url("health"), "http://localhost:8000/api/health");
    }

    #[test]
    fn test_error_detail_prefers_fastapi_body() {
        let body = r#"{"detail": "No song found. Please sync playlist first."}"#;
        assert_eq!(
            error_detail(body),
            "No song found. Please sync playlist first."
        );
    }

    #[test]
    fn test_error_detail_truncates_raw_body() {
        let body = "x".repeat(500);
        let detail = error_detail(&body);
        assert!(detail.len() <= 203);
        assert!(detail.ends_with("..."));
    }

    #[test]
    fn test_catalog_gate_maps_recommend_404() {
        let err = catalog_gate(ClientError::Status {
            status: StatusCode::NOT_FOUND,
            message: "No song found. Please sync playlist first.".into(),
        });
        assert!(err.is_catalog_not_ready());

        let err = catalog_gate(ClientError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".into(),
        });
        assert!(!err.is_catalog_not_ready());
    }
}
