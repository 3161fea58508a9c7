//! Frame capture: the device seam and the periodic capture task.
//!
//! The capture task runs for the whole session and is switched on and off
//! through a watch flag, so starting and stopping detection never tears a
//! task down mid-await. Captures are awaited inline in the tick arm, which
//! makes overlapping captures structurally impossible; a tick that fires
//! while a frame is still being produced is simply absorbed by the interval.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Upper bound on a single device capture. A device that takes longer is
/// treated as unavailable for that tick.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// One captured still, encoded for the wire.
#[derive(Debug, Clone)]
pub struct Sample {
    pub captured_at: DateTime<Utc>,
    pub image_base64: String,
}

/// A source of still frames.
///
/// `capture` may acquire the underlying device lazily. `close` releases it
/// and must tolerate being called more than once; the capture task closes on
/// every pause and again on teardown.
#[async_trait]
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    /// Produce one base64-encoded frame.
    async fn capture(&mut self) -> Result<String>;

    /// Release the underlying device.
    async fn close(&mut self);
}

/// What the capture task reports back to the session loop.
#[derive(Debug, Clone)]
pub enum CaptureUpdate {
    Frame(Sample),
    /// The device failed to produce a frame. Sent once per outage, not once
    /// per tick.
    DeviceDown(String),
    /// The device produced a frame again after an outage.
    DeviceRecovered,
}

/// Replays stills from a directory in filename order, cycling at the end.
///
/// Stands in for a camera on headless machines and in smoke tests. The
/// directory is re-listed on every capture, so frames can be dropped in
/// while a session runs.
pub struct FrameDirectory {
    dir: PathBuf,
    cursor: usize,
}

impl FrameDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cursor: 0,
        }
    }

    fn frame_paths(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read frames dir: {}", self.dir.display()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            anyhow::bail!(
                "No frames (*.jpg, *.jpeg, *.png) in {}",
                self.dir.display()
            );
        }
        Ok(paths)
    }
}

#[async_trait]
impl CaptureDevice for FrameDirectory {
    fn name(&self) -> &str {
        "frame-directory"
    }

    async fn capture(&mut self) -> Result<String> {
        let paths = self.frame_paths()?;
        let path = &paths[self.cursor % paths.len()];
        self.cursor = self.cursor.wrapping_add(1);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read frame: {}", path.display()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    async fn close(&mut self) {}
}

/// Drive `device` on a fixed cadence, reporting frames and outages to `tx`.
///
/// The task starts idle; flip `enabled` to true to begin capturing. Enabling
/// resets the interval so the first frame arrives immediately. Disabling
/// releases the device right away. Missed ticks collapse instead of queueing.
pub fn spawn_capture_loop(
    mut device: Box<dyn CaptureDevice>,
    interval: Duration,
    mut enabled: watch::Receiver<bool>,
    tx: mpsc::Sender<CaptureUpdate>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut down = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = enabled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *enabled.borrow() {
                        ticker.reset_immediately();
                    } else {
                        device.close().await;
                        tracing::debug!(device = device.name(), "capture paused, device released");
                    }
                }
                _ = ticker.tick(), if *enabled.borrow() => {
                    match tokio::time::timeout(CAPTURE_TIMEOUT, device.capture()).await {
                        Ok(Ok(image_base64)) => {
                            if down {
                                down = false;
                                let _ = tx.send(CaptureUpdate::DeviceRecovered).await;
                            }
                            let sample = Sample {
                                captured_at: Utc::now(),
                                image_base64,
                            };
                            if tx.send(CaptureUpdate::Frame(sample)).await.is_err() {
                                break;
                            }
                        }
                        Ok(Err(e)) => report_down(&mut down, device.name(), &e.to_string(), &tx).await,
                        Err(_) => report_down(&mut down, device.name(), "capture timed out", &tx).await,
                    }
                }
            }
        }
        device.close().await;
    })
}

async fn report_down(
    down: &mut bool,
    device: &str,
    reason: &str,
    tx: &mpsc::Sender<CaptureUpdate>,
) {
    if *down {
        tracing::debug!(device, "capture still failing");
        return;
    }
    *down = true;
    tracing::warn!(device, reason, "capture device unavailable");
    let _ = tx.send(CaptureUpdate::DeviceDown(reason.to_string())).await;
}
