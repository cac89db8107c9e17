//! fall-watch
//!
//! Posture monitoring for a single camera feed. Each frame is run through a
//! posture detector (sitting, standing, falling); a debouncer turns
//! sustained postures into alerts, which are pushed to a notification
//! service. Falls also store the triggering frame on disk.
//!
//! # Alert rules
//!
//! 1. **Sitting**: a confident sitting detection in every frame for 5 minutes.
//! 2. **Falling**: a confident falling detection in every frame for 1 minute.
//!
//! A single frame without the posture restarts its window, and a fired alert
//! restarts it too, so a condition that persists fires again once per window.
//!
//! # Module Structure
//!
//! - `debounce`: Alert timers (AlertDebouncer, AlertEvent)
//! - `detect`: Posture detections and detector backends
//! - `frame`: RGB frames and detection overlay
//! - `ingest`: Frame sources (cameras, local files, `stub://`)
//! - `notify`: Push notifications (LINE Notify)
//! - `storage`: Fall snapshot storage
//! - `session`: Capture thread, session handle and the single-session Watcher
//! - `config`: File and environment configuration

pub mod config;
pub mod debounce;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod session;
pub mod storage;

pub use config::FallWatchConfig;
pub use debounce::{AlertCondition, AlertDebouncer, AlertEvent, DebounceSettings, TimerState};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{
    BoundingBox, Detection, DetectionFrame, DetectorBackend, PostureClass, ScriptedBackend,
};
pub use frame::{annotate, Frame};
pub use ingest::{open_source, CaptureSettings, FileConfig, FileSource, FrameSource, SourceSpec};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use notify::{alert_message, send_test_notification, LineNotifier, Notifier, NotifyToken};
pub use session::{
    AlertReport, CaptureSession, EndReason, FrameReport, SessionConfig, SessionEvent,
    SessionHandle, SessionSummary, Watcher,
};
pub use storage::{DirectorySnapshotStore, InMemorySnapshotStore, SnapshotStore};
