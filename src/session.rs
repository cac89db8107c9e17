//! Capture sessions.
//!
//! A session owns one frame source, one detector and one alert debouncer, and
//! runs them on a single background thread:
//!
//! 1. Read the next frame (end-of-stream or a read error ends the session)
//! 2. Run the detector
//! 3. Feed the debouncer with the frame's capture instant
//! 4. For each fired alert: notify, and for falls also store the frame
//! 5. Hand the annotated frame to the presentation side
//!
//! Annotated frames travel on a small bounded queue and are dropped when the
//! presentation side falls behind. Alerts and the end-of-session notice travel
//! on a separate unbounded channel so they are never dropped.
//!
//! `Watcher` keeps at most one session alive; opening a new one stops the old
//! one first. Debouncer state never outlives its session.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::debounce::{AlertCondition, AlertDebouncer, AlertEvent, DebounceSettings};
use crate::detect::{DetectionFrame, DetectorBackend};
use crate::frame::annotate;
use crate::ingest::FrameSource;
use crate::notify::{alert_message, Notifier, NotifyToken};
use crate::storage::SnapshotStore;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);
const FRAME_QUEUE_DEPTH: usize = 4;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings owned by one session.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub token: NotifyToken,
    pub debounce: DebounceSettings,
    /// Stop after this many frames (unbounded when `None`).
    pub max_frames: Option<u64>,
}

/// One processed frame, ready for display.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub index: u64,
    pub image: RgbImage,
    pub detections: DetectionFrame,
    pub alerts: Vec<AlertEvent>,
}

#[derive(Clone, Debug)]
pub struct AlertReport {
    pub event: AlertEvent,
    pub frame_index: u64,
    /// Where the triggering frame was stored (falls only).
    pub snapshot: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    EndOfStream,
    FrameLimit,
    Stopped,
    ReadError(String),
    DetectorError(String),
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    Alert(AlertReport),
    Ended(EndReason),
}

#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub source: String,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub alerts: Vec<AlertEvent>,
    pub end: EndReason,
}

impl SessionSummary {
    pub fn alert_count(&self, condition: AlertCondition) -> usize {
        self.alerts
            .iter()
            .filter(|a| a.condition == condition)
            .count()
    }
}

/// An unstarted session.
pub struct CaptureSession {
    config: SessionConfig,
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    notifier: Box<dyn Notifier>,
    snapshots: Box<dyn SnapshotStore>,
}

impl CaptureSession {
    pub fn new(
        config: SessionConfig,
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        notifier: Box<dyn Notifier>,
        snapshots: Box<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            source,
            detector,
            notifier,
            snapshots,
        }
    }

    /// Open the source and start the capture thread.
    ///
    /// An open failure is returned here and no thread is started.
    pub fn start(mut self) -> Result<SessionHandle> {
        let source_name = self.source.describe();
        self.source
            .connect()
            .with_context(|| format!("open capture source {}", source_name))?;
        if self.config.token.is_empty() {
            log::warn!(
                "session {}: notify token not set, alerts will not be delivered",
                source_name
            );
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::sync_channel(FRAME_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel();

        let worker = Worker {
            debouncer: AlertDebouncer::new(self.config.debounce),
            session: self,
            stop: stop.clone(),
            frames: frame_tx,
            events: event_tx,
            source_name: source_name.clone(),
        };
        let join = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || worker.run())
            .context("spawn capture thread")?;

        log::info!("session started on {}", source_name);
        Ok(SessionHandle {
            source: source_name,
            stop,
            join: Some(join),
            frames: frame_rx,
            events: event_rx,
        })
    }
}

/// Handle to a running session.
pub struct SessionHandle {
    source: String,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<SessionSummary>>,
    frames: Receiver<FrameReport>,
    events: Receiver<SessionEvent>,
}

impl SessionHandle {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Annotated frames for display.
    pub fn frames(&self) -> &Receiver<FrameReport> {
        &self.frames
    }

    /// Alerts and the end-of-session notice.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Ask the capture thread to stop.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Request a stop and wait up to `timeout` for the thread to exit.
    ///
    /// Returns `None` when the thread is still busy (for example inside a
    /// slow notification call); it is left to finish on its own and its
    /// `Ended` event still arrives on `events()`.
    pub fn stop(&mut self, timeout: Duration) -> Result<Option<SessionSummary>> {
        self.request_stop();
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "session on {} did not stop within {:?}; detaching",
                    self.source,
                    timeout
                );
                self.join.take();
                return Ok(None);
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        self.join_thread().map(Some)
    }

    /// Wait for the session to end on its own.
    pub fn wait(mut self) -> Result<SessionSummary> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<SessionSummary> {
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("session already joined"))?;
        join.join()
            .map_err(|_| anyhow!("capture thread panicked"))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.request_stop();
    }
}

struct Worker {
    session: CaptureSession,
    debouncer: AlertDebouncer,
    stop: Arc<AtomicBool>,
    frames: SyncSender<FrameReport>,
    events: Sender<SessionEvent>,
    source_name: String,
}

impl Worker {
    fn run(mut self) -> SessionSummary {
        let mut frames_processed = 0u64;
        let mut frames_dropped = 0u64;
        let mut alerts = Vec::new();

        let end = loop {
            if self.stop.load(Ordering::SeqCst) {
                break EndReason::Stopped;
            }
            if self
                .session
                .config
                .max_frames
                .is_some_and(|max| frames_processed >= max)
            {
                break EndReason::FrameLimit;
            }

            let frame = match self.session.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break EndReason::EndOfStream,
                Err(err) => {
                    log::warn!("session on {}: frame read failed: {:#}", self.source_name, err);
                    break EndReason::ReadError(err.to_string());
                }
            };

            let detections = match self.session.detector.infer(&frame) {
                Ok(detections) => detections,
                Err(err) => {
                    log::error!(
                        "session on {}: {} inference failed: {:#}",
                        self.source_name,
                        self.session.detector.name(),
                        err
                    );
                    break EndReason::DetectorError(err.to_string());
                }
            };
            log::debug!(
                "frame #{}: [{}]",
                frame.index,
                detections
                    .detections
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let fired = self.debouncer.evaluate(&detections, frame.captured_at);
            frames_processed += 1;

            let mut image = match frame.to_image() {
                Ok(image) => image,
                Err(err) => break EndReason::ReadError(err.to_string()),
            };
            for event in &fired {
                let snapshot = self.dispatch(event, &image);
                let _ = self.events.send(SessionEvent::Alert(AlertReport {
                    event: *event,
                    frame_index: frame.index,
                    snapshot,
                }));
            }
            alerts.extend(fired.iter().copied());

            annotate(
                &mut image,
                &detections,
                self.debouncer.settings().min_confidence,
            );
            let report = FrameReport {
                index: frame.index,
                image,
                detections,
                alerts: fired,
            };
            match self.frames.try_send(report) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => frames_dropped += 1,
            }
        };

        let stats = self.session.source.stats();
        log::info!(
            "session on {} ended ({:?}) after {} frames ({} captured), {} alerts",
            self.source_name,
            end,
            frames_processed,
            stats.frames_captured,
            alerts.len()
        );
        if matches!(end, EndReason::ReadError(_)) && !self.session.source.is_healthy() {
            log::warn!("source {} reports unhealthy", stats.source);
        }
        let _ = self.events.send(SessionEvent::Ended(end.clone()));

        SessionSummary {
            source: self.source_name,
            frames_processed,
            frames_dropped,
            alerts,
            end,
        }
    }

    /// Alert side effects. Delivery is a single blocking attempt; failures are logged only.
    fn dispatch(&self, event: &AlertEvent, raw: &RgbImage) -> Option<PathBuf> {
        log::info!("{:?} alert fired on {}", event.condition, self.source_name);

        let message = alert_message(event.condition);
        if let Err(err) = self
            .session
            .notifier
            .notify(message, &self.session.config.token)
        {
            log::warn!(
                "{} notification failed: {:#}",
                self.session.notifier.name(),
                err
            );
        }

        if event.condition != AlertCondition::Falling {
            return None;
        }
        match self.session.snapshots.save(raw, Local::now()) {
            Ok(path) => {
                log::info!("fall snapshot written to {}", path.display());
                Some(path)
            }
            Err(err) => {
                log::error!("fall snapshot failed: {:#}", err);
                None
            }
        }
    }
}

/// Keeps at most one capture session running.
pub struct Watcher {
    active: Option<SessionHandle>,
    stop_timeout: Duration,
}

impl Watcher {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            active: None,
            stop_timeout,
        }
    }

    /// Stop any running session, then start `session`.
    ///
    /// The previous session is stopped even when the new one fails to open.
    pub fn open(&mut self, session: CaptureSession) -> Result<&SessionHandle> {
        self.close()?;
        let handle = session.start()?;
        Ok(&*self.active.insert(handle))
    }

    /// Stop the running session, if any.
    pub fn close(&mut self) -> Result<Option<SessionSummary>> {
        match self.active.take() {
            Some(mut handle) => {
                log::info!("stopping session on {}", handle.source());
                handle.stop(self.stop_timeout)
            }
            None => Ok(None),
        }
    }

    pub fn active(&self) -> Option<&SessionHandle> {
        self.active.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("failed to stop session on drop: {:#}", err);
        }
    }
}
