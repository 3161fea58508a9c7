//! The session actor: one task owns every piece of mutable session state.
//!
//! Commands arrive on a channel, prediction and recommendation resolutions
//! arrive on another, frames on a third. Because a single select loop
//! processes them all, each tick's fuse / append / trigger block runs
//! without interleaving and no locking is needed beyond the history handle
//! shared with readers.
//!
//! Stopping detection bumps a generation counter. Requests carry the
//! generation current when they were issued; a resolution whose generation
//! no longer matches is discarded, so a stop between issue and resolution
//! can never mutate the session from a stale tick. The recommend task is
//! additionally aborted outright, taking its request off the wire.

use crate::capture::{spawn_capture_loop, CaptureDevice, CaptureUpdate, Sample};
use crate::history::{HistoryEntry, HistoryLog, HistorySummary};
use crate::trigger::{RecommendRequest, RecommendationTrigger, TriggerEvent};
use anyhow::Result;
use chrono::Utc;
use euterpe_client::{ClientError, EmotionService, FeedbackRequest};
use euterpe_core::{
    Emotion, EuterpeConfig, FeedbackRating, FusedEstimate, FusionEngine, Modality, ModalityResult,
    Recommendation,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Conditions the presentation layer should surface to the listener.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// The capture device could not produce a frame. Sent once per outage;
    /// detection stays on and resumes when the device comes back.
    DeviceUnavailable(String),
    DeviceRecovered,
    /// A submitted text line was classified; it joins the next fusion tick.
    TextAnalyzed(ModalityResult),
    TextFailed(String),
    /// A new recommendation became current.
    NowPlaying(Recommendation),
    RecommendationFailed(String),
    /// Recommendation refused because no catalog has been synced yet.
    CatalogNotReady,
    FeedbackLogged(FeedbackRating),
    FeedbackFailed(String),
}

enum Command {
    StartDetection,
    StopDetection,
    SubmitText(String),
    SubmitFeedback(FeedbackRating),
}

/// Completions of requests the loop issued, tagged with the generation at
/// issue time.
enum Resolved {
    Face {
        generation: u64,
        result: Result<ModalityResult, ClientError>,
    },
    Text {
        generation: u64,
        result: Result<ModalityResult, ClientError>,
    },
    Recommend {
        generation: u64,
        emotion: Emotion,
        result: Result<Recommendation, ClientError>,
    },
}

/// Commands and queries for a running session. Cheap to clone; the session
/// winds down once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    estimate_rx: watch::Receiver<Option<FusedEstimate>>,
    recommendation_rx: watch::Receiver<Option<Recommendation>>,
    history: Arc<RwLock<HistoryLog>>,
}

impl SessionHandle {
    pub async fn start_detection(&self) -> Result<()> {
        self.send(Command::StartDetection).await
    }

    pub async fn stop_detection(&self) -> Result<()> {
        self.send(Command::StopDetection).await
    }

    /// Classify a line of text; the result joins the next fusion tick.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SubmitText(text.into())).await
    }

    /// Log a reaction to the current track. `skip` also forces a new
    /// recommendation.
    pub async fn submit_feedback(&self, rating: FeedbackRating) -> Result<()> {
        self.send(Command::SubmitFeedback(rating)).await
    }

    pub fn current_estimate(&self) -> Option<FusedEstimate> {
        self.estimate_rx.borrow().clone()
    }

    pub fn current_recommendation(&self) -> Option<Recommendation> {
        self.recommendation_rx.borrow().clone()
    }

    pub fn watch_estimate(&self) -> watch::Receiver<Option<FusedEstimate>> {
        self.estimate_rx.clone()
    }

    pub fn watch_recommendation(&self) -> watch::Receiver<Option<Recommendation>> {
        self.recommendation_rx.clone()
    }

    pub async fn history_snapshot(&self) -> Vec<HistoryEntry> {
        self.history.read().await.snapshot()
    }

    pub async fn history_summary(&self) -> HistorySummary {
        self.history.read().await.summary()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("session has shut down"))
    }
}

/// Builds the channel plumbing and, once spawned, runs the session loop.
pub struct SessionController<S> {
    state: SessionState<S>,
    device: Box<dyn CaptureDevice>,
    capture_interval: Duration,
    enabled_rx: watch::Receiver<bool>,
    frame_tx: mpsc::Sender<CaptureUpdate>,
    frame_rx: mpsc::Receiver<CaptureUpdate>,
    cmd_rx: mpsc::Receiver<Command>,
    resolved_rx: mpsc::Receiver<Resolved>,
    cancel: CancellationToken,
}

impl<S: EmotionService + 'static> SessionController<S> {
    pub fn new(
        service: S,
        device: Box<dyn CaptureDevice>,
        config: &EuterpeConfig,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionNotice>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (notice_tx, notice_rx) = mpsc::channel(32);
        let (resolved_tx, resolved_rx) = mpsc::channel(32);
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (enabled_tx, enabled_rx) = watch::channel(false);
        let (estimate_tx, estimate_rx) = watch::channel(None);
        let (recommendation_tx, recommendation_rx) = watch::channel(None);
        let history = Arc::new(RwLock::new(HistoryLog::new()));

        let state = SessionState {
            service: Arc::new(service),
            engine: FusionEngine::new(config.fusion.clone()),
            trigger: RecommendationTrigger::new(config.fusion.confidence_threshold),
            history: Arc::clone(&history),
            estimate_tx,
            recommendation_tx,
            notice_tx,
            resolved_tx,
            enabled_tx,
            detecting: false,
            generation: 0,
            face_in_flight: false,
            recommend_task: None,
            pending_text: None,
        };
        let controller = Self {
            state,
            device,
            // A zero interval would busy-spin the ticker.
            capture_interval: Duration::from_secs(config.capture.interval_secs.max(1)),
            enabled_rx,
            frame_tx,
            frame_rx,
            cmd_rx,
            resolved_rx,
            cancel: CancellationToken::new(),
        };
        let handle = SessionHandle {
            cmd_tx,
            estimate_rx,
            recommendation_rx,
            history,
        };
        (controller, handle, notice_rx)
    }

    /// Start the capture task and the session loop. The returned handle
    /// resolves after every handle is dropped and the device is released.
    pub fn spawn(self) -> JoinHandle<()> {
        let SessionController {
            mut state,
            device,
            capture_interval,
            enabled_rx,
            frame_tx,
            frame_rx,
            cmd_rx,
            resolved_rx,
            cancel,
        } = self;
        let capture = spawn_capture_loop(
            device,
            capture_interval,
            enabled_rx,
            frame_tx,
            cancel.clone(),
        );
        tokio::spawn(async move {
            state.run(cmd_rx, resolved_rx, frame_rx).await;
            cancel.cancel();
            if capture.await.is_err() {
                tracing::debug!("capture task aborted");
            }
            tracing::info!("session ended");
        })
    }
}

struct SessionState<S> {
    service: Arc<S>,
    engine: FusionEngine,
    trigger: RecommendationTrigger,
    history: Arc<RwLock<HistoryLog>>,
    estimate_tx: watch::Sender<Option<FusedEstimate>>,
    recommendation_tx: watch::Sender<Option<Recommendation>>,
    notice_tx: mpsc::Sender<SessionNotice>,
    resolved_tx: mpsc::Sender<Resolved>,
    enabled_tx: watch::Sender<bool>,
    detecting: bool,
    generation: u64,
    /// At most one face prediction at a time; frames arriving while one is
    /// in flight are dropped.
    face_in_flight: bool,
    /// The recommend request currently on the wire, if any. Aborted on stop
    /// rather than left to resolve into a dead generation.
    recommend_task: Option<JoinHandle<()>>,
    /// Text classification waiting for the next fusion tick.
    pending_text: Option<ModalityResult>,
}

impl<S: EmotionService + 'static> SessionState<S> {
    async fn run(
        &mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut resolved_rx: mpsc::Receiver<Resolved>,
        mut frame_rx: mpsc::Receiver<CaptureUpdate>,
    ) {
        loop {
            tokio::select! {
                command = cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle is gone.
                    None => break,
                },
                Some(resolved) = resolved_rx.recv() => self.handle_resolved(resolved).await,
                Some(update) = frame_rx.recv() => self.handle_capture(update),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartDetection => {
                if self.detecting {
                    tracing::debug!("detection already running");
                    return;
                }
                self.detecting = true;
                let _ = self.enabled_tx.send(true);
                tracing::info!("detection started");
            }
            Command::StopDetection => {
                if !self.detecting {
                    tracing::debug!("detection already stopped");
                    return;
                }
                self.detecting = false;
                let _ = self.enabled_tx.send(false);
                // Face and text requests issued before this point resolve
                // into the old generation and are discarded on arrival; the
                // recommend request is taken off the wire outright.
                self.generation = self.generation.wrapping_add(1);
                self.face_in_flight = false;
                if let Some(task) = self.recommend_task.take() {
                    task.abort();
                }
                self.pending_text = None;
                self.trigger.abandon_in_flight();
                tracing::info!("detection stopped");
            }
            Command::SubmitText(text) => self.submit_text(text),
            Command::SubmitFeedback(rating) => self.submit_feedback(rating),
        }
    }

    fn handle_capture(&mut self, update: CaptureUpdate) {
        match update {
            CaptureUpdate::Frame(sample) => self.on_frame(sample),
            CaptureUpdate::DeviceDown(reason) => {
                tracing::warn!(%reason, "no samples until the capture device returns");
                self.notify(SessionNotice::DeviceUnavailable(reason));
            }
            CaptureUpdate::DeviceRecovered => {
                tracing::info!("capture device recovered");
                self.notify(SessionNotice::DeviceRecovered);
            }
        }
    }

    fn on_frame(&mut self, sample: Sample) {
        if !self.detecting {
            // The frame raced a stop command.
            return;
        }
        if self.face_in_flight {
            tracing::debug!("face prediction still in flight, dropping frame");
            return;
        }
        self.face_in_flight = true;
        let service = Arc::clone(&self.service);
        let resolved_tx = self.resolved_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = service.predict_face(&sample.image_base64).await;
            let _ = resolved_tx
                .send(Resolved::Face { generation, result })
                .await;
        });
    }

    async fn handle_resolved(&mut self, resolved: Resolved) {
        match resolved {
            Resolved::Face { generation, result } => {
                if generation != self.generation {
                    tracing::debug!("discarding a face prediction from a stopped run");
                    return;
                }
                self.face_in_flight = false;
                match result {
                    Ok(face) => self.run_tick(face).await,
                    Err(e) => tracing::warn!(error = %e, "face prediction failed, skipping tick"),
                }
            }
            Resolved::Text { generation, result } => {
                if generation != self.generation {
                    tracing::debug!("discarding a text prediction from a stopped run");
                    return;
                }
                match result {
                    Ok(text) => {
                        tracing::info!(
                            emotion = %text.emotion,
                            confidence = text.confidence,
                            "text analyzed"
                        );
                        self.notify(SessionNotice::TextAnalyzed(text.clone()));
                        self.pending_text = Some(text);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "text prediction failed");
                        self.notify(SessionNotice::TextFailed(e.to_string()));
                    }
                }
            }
            Resolved::Recommend {
                generation,
                emotion,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!("discarding a recommendation from a stopped run");
                    return;
                }
                self.recommend_task = None;
                match result {
                    Ok(track) => {
                        tracing::info!(track = %track.describe(), %emotion, "now playing");
                        // The trigger's matched label and the published
                        // track move together.
                        self.trigger.apply(TriggerEvent::Resolved {
                            emotion,
                            recommendation_id: track.id.clone(),
                        });
                        self.recommendation_tx.send_replace(Some(track.clone()));
                        self.notify(SessionNotice::NowPlaying(track));
                    }
                    Err(e) if e.is_catalog_not_ready() => {
                        tracing::warn!("recommendation refused, no catalog synced yet");
                        self.trigger.apply(TriggerEvent::Failed);
                        self.notify(SessionNotice::CatalogNotReady);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "recommendation request failed");
                        self.trigger.apply(TriggerEvent::Failed);
                        self.notify(SessionNotice::RecommendationFailed(e.to_string()));
                    }
                }
            }
        }
    }

    /// One detection tick: fuse the available modality results, append to
    /// history, publish, consult the trigger. Runs without an await between
    /// the append and the trigger so the block is never interleaved.
    async fn run_tick(&mut self, face: ModalityResult) {
        let mut inputs: BTreeMap<Modality, ModalityResult> = BTreeMap::new();
        inputs.insert(Modality::Face, face);
        if let Some(text) = self.pending_text.take() {
            inputs.insert(Modality::Text, text);
        }
        let previous = self.estimate_tx.borrow().as_ref().map(|e| e.emotion);
        let estimate = match self.engine.fuse(&inputs, previous) {
            Ok(estimate) => estimate,
            Err(e) => {
                tracing::error!(error = %e, "fusion rejected the tick's inputs");
                return;
            }
        };
        tracing::debug!(
            emotion = %estimate.emotion,
            confidence = estimate.confidence,
            modalities = inputs.len(),
            "fused estimate"
        );

        self.history.write().await.append(estimate.clone());
        self.estimate_tx.send_replace(Some(estimate.clone()));
        if let Some(request) = self.trigger.apply(TriggerEvent::Estimate {
            emotion: estimate.emotion,
            confidence: estimate.confidence,
        }) {
            self.issue_recommend(request);
        }
    }

    fn issue_recommend(&mut self, request: RecommendRequest) {
        tracing::info!(
            emotion = %request.emotion,
            exclude = ?request.exclude,
            "requesting a recommendation"
        );
        let service = Arc::clone(&self.service);
        let resolved_tx = self.resolved_tx.clone();
        let generation = self.generation;
        let emotion = request.emotion;
        self.recommend_task = Some(tokio::spawn(async move {
            let result = service.recommend(emotion, request.exclude.as_deref()).await;
            let _ = resolved_tx
                .send(Resolved::Recommend {
                    generation,
                    emotion,
                    result,
                })
                .await;
        }));
    }

    fn submit_text(&self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        let service = Arc::clone(&self.service);
        let resolved_tx = self.resolved_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = service.predict_text(&text).await;
            let _ = resolved_tx
                .send(Resolved::Text { generation, result })
                .await;
        });
    }

    fn submit_feedback(&mut self, rating: FeedbackRating) {
        let current = self.recommendation_tx.borrow().clone();
        let Some(current) = current else {
            tracing::info!(%rating, "feedback with nothing playing, ignoring");
            return;
        };
        let estimate = self.estimate_tx.borrow().clone();
        let (emotion, confidence) = match &estimate {
            Some(e) => (e.emotion, e.confidence),
            None => (self.trigger.last_emotion(), 0.0),
        };
        let feedback = FeedbackRequest {
            song_id: current.id,
            emotion,
            emotion_confidence: confidence,
            rating,
            timestamp: Utc::now(),
        };
        let service = Arc::clone(&self.service);
        let notice_tx = self.notice_tx.clone();
        tokio::spawn(async move {
            match service.log_feedback(&feedback).await {
                Ok(_) => {
                    tracing::debug!(song = %feedback.song_id, %rating, "feedback logged");
                    let _ = notice_tx.try_send(SessionNotice::FeedbackLogged(rating));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "feedback logging failed");
                    let _ = notice_tx.try_send(SessionNotice::FeedbackFailed(e.to_string()));
                }
            }
        });

        if rating == FeedbackRating::Skip {
            if let Some(request) = self.trigger.apply(TriggerEvent::Force { emotion }) {
                self.issue_recommend(request);
            }
        }
    }

    fn notify(&self, notice: SessionNotice) {
        match self.notice_tx.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(notice)) => {
                tracing::warn!(?notice, "notice channel full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
