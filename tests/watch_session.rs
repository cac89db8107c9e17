use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use fall_watch::notify::{FALLING_ALERT_MESSAGE, SITTING_ALERT_MESSAGE};
use fall_watch::{
    open_source, AlertCondition, AlertReport, BoundingBox, CaptureSession, CaptureSettings,
    DebounceSettings, Detection, DetectionFrame, DetectorBackend, EndReason, Frame, FrameSource,
    InMemorySnapshotStore, Notifier, NotifyToken, PostureClass, ScriptedBackend, SessionConfig,
    SessionEvent, SessionHandle, SourceSpec, Watcher,
};

#[derive(Clone, Default)]
struct Recording {
    sent: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&self, message: &str, _token: &NotifyToken) -> Result<()> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

struct Unreachable;

impl Notifier for Unreachable {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn notify(&self, _message: &str, _token: &NotifyToken) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

/// Blocks inside `notify`, like a request to an unresponsive server.
struct Stalled {
    entered: Sender<()>,
    delay: Duration,
}

impl Notifier for Stalled {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn notify(&self, _message: &str, _token: &NotifyToken) -> Result<()> {
        let _ = self.entered.send(());
        std::thread::sleep(self.delay);
        Ok(())
    }
}

/// Reports nothing; flags when it is dropped with its session.
struct DropFlag(Arc<AtomicBool>);

impl DetectorBackend for DropFlag {
    fn name(&self) -> &'static str {
        "drop-flag"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<DetectionFrame> {
        Ok(DetectionFrame::default())
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Unplugged;

impl FrameSource for Unplugged {
    fn describe(&self) -> String {
        "unplugged".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        Err(anyhow!("no such device"))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }

    fn is_healthy(&self) -> bool {
        false
    }

    fn stats(&self) -> fall_watch::ingest::SourceStats {
        fall_watch::ingest::SourceStats {
            frames_captured: 0,
            source: "unplugged".to_string(),
        }
    }
}

/// Finite source whose frames advance a clock shared across sessions.
struct SharedClock {
    clock: Arc<Mutex<Instant>>,
    step: Duration,
    frames: u64,
    index: u64,
}

impl SharedClock {
    fn new(clock: &Arc<Mutex<Instant>>, frames: u64) -> Self {
        Self {
            clock: clock.clone(),
            step: Duration::from_secs(10),
            frames,
            index: 0,
        }
    }
}

impl FrameSource for SharedClock {
    fn describe(&self) -> String {
        "shared-clock".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.index >= self.frames {
            return Ok(None);
        }
        let mut now = self.clock.lock().unwrap();
        let captured_at = *now;
        *now += self.step;
        let index = self.index;
        self.index += 1;
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, index, captured_at).map(Some)
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> fall_watch::ingest::SourceStats {
        fall_watch::ingest::SourceStats {
            frames_captured: self.index,
            source: self.describe(),
        }
    }
}

fn drain_until_end(handle: &SessionHandle) -> (Vec<AlertReport>, EndReason) {
    let mut alerts = Vec::new();
    loop {
        match handle.events().recv_timeout(Duration::from_secs(5)).unwrap() {
            SessionEvent::Alert(report) => alerts.push(report),
            SessionEvent::Ended(reason) => return (alerts, reason),
        }
    }
}

fn settings() -> CaptureSettings {
    CaptureSettings {
        target_fps: 0,
        width: 32,
        height: 24,
    }
}

fn stub(location: &str) -> Box<dyn FrameSource> {
    let spec: SourceSpec = location.parse().unwrap();
    open_source(&spec, settings()).unwrap()
}

fn person(class: PostureClass) -> Detection {
    Detection::new(class, 0.9, BoundingBox::new(4.0, 4.0, 20.0, 16.0))
}

fn token() -> NotifyToken {
    NotifyToken::new("test-token")
}

fn config() -> SessionConfig {
    SessionConfig {
        token: token(),
        ..SessionConfig::default()
    }
}

#[test]
fn sustained_fall_notifies_once_and_stores_unannotated_frame() {
    let notifier = Recording::default();
    let snapshots = InMemorySnapshotStore::new();
    // Frames every 10 s from t=0 to t=90.
    let session = CaptureSession::new(
        config(),
        stub("device:stub://cam?frames=10&interval_ms=10000"),
        Box::new(ScriptedBackend::constant(vec![person(PostureClass::Falling)])),
        Box::new(notifier.clone()),
        Box::new(snapshots.clone()),
    );

    let handle = session.start().unwrap();
    let first = handle
        .frames()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    let mut alerts = Vec::new();
    loop {
        match handle.events().recv_timeout(Duration::from_secs(5)).unwrap() {
            SessionEvent::Alert(report) => alerts.push(report),
            SessionEvent::Ended(reason) => {
                assert_eq!(reason, EndReason::EndOfStream);
                break;
            }
        }
    }
    let summary = handle.wait().unwrap();

    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.alert_count(AlertCondition::Falling), 1);
    assert_eq!(summary.alert_count(AlertCondition::Sitting), 0);

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].frame_index, 6);
    assert!(alerts[0].snapshot.is_some());
    assert_eq!(notifier.messages(), vec![FALLING_ALERT_MESSAGE.to_string()]);

    // The overlay is drawn on displayed frames only.
    assert_eq!(first.index, 0);
    assert_eq!(first.image.get_pixel(4, 4).0, [255, 0, 0]);
    let stored = snapshots.images();
    assert_eq!(stored.len(), 1);
    assert_ne!(stored[0].get_pixel(4, 4).0, [255, 0, 0]);
}

#[test]
fn sustained_sitting_notifies_without_snapshot() {
    let notifier = Recording::default();
    let snapshots = InMemorySnapshotStore::new();
    // t=0..=300 s
    let session = CaptureSession::new(
        config(),
        stub("device:stub://cam?frames=31&interval_ms=10000"),
        Box::new(ScriptedBackend::constant(vec![person(PostureClass::Sitting)])),
        Box::new(notifier.clone()),
        Box::new(snapshots.clone()),
    );

    let summary = session.start().unwrap().wait().unwrap();

    assert_eq!(summary.alert_count(AlertCondition::Sitting), 1);
    assert_eq!(notifier.messages(), vec![SITTING_ALERT_MESSAGE.to_string()]);
    assert!(snapshots.is_empty());
}

#[test]
fn notification_failure_does_not_end_session() {
    let snapshots = InMemorySnapshotStore::new();
    let session = CaptureSession::new(
        config(),
        stub("device:stub://cam?frames=10&interval_ms=10000"),
        Box::new(ScriptedBackend::constant(vec![person(PostureClass::Falling)])),
        Box::new(Unreachable),
        Box::new(snapshots.clone()),
    );

    let summary = session.start().unwrap().wait().unwrap();

    assert_eq!(summary.end, EndReason::EndOfStream);
    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.alert_count(AlertCondition::Falling), 1);
    assert_eq!(snapshots.len(), 1);
}

#[test]
fn open_failure_is_reported_before_start() {
    let session = CaptureSession::new(
        config(),
        Box::new(Unplugged),
        Box::new(ScriptedBackend::default()),
        Box::new(Recording::default()),
        Box::new(InMemorySnapshotStore::new()),
    );
    let mut watcher = Watcher::default();
    assert!(watcher.open(session).is_err());
    assert!(watcher.active().is_none());
    assert!(!watcher.is_running());
}

#[test]
fn stop_joins_running_session() {
    let session = CaptureSession::new(
        config(),
        stub("device:stub://endless"),
        Box::new(ScriptedBackend::default()),
        Box::new(Recording::default()),
        Box::new(InMemorySnapshotStore::new()),
    );
    let mut handle = session.start().unwrap();
    handle
        .frames()
        .recv_timeout(Duration::from_secs(5))
        .unwrap();

    let summary = handle
        .stop(Duration::from_secs(5))
        .unwrap()
        .expect("joined within timeout");
    assert_eq!(summary.end, EndReason::Stopped);
    assert!(summary.frames_processed >= 1);
}

#[test]
fn opening_a_session_stops_the_previous_one() {
    let first_dropped = Arc::new(AtomicBool::new(false));
    let mut watcher = Watcher::new(Duration::from_secs(5));

    watcher
        .open(CaptureSession::new(
            config(),
            stub("device:stub://first"),
            Box::new(DropFlag(first_dropped.clone())),
            Box::new(Recording::default()),
            Box::new(InMemorySnapshotStore::new()),
        ))
        .unwrap();
    assert!(!first_dropped.load(Ordering::SeqCst));

    let second = watcher
        .open(CaptureSession::new(
            config(),
            stub("device:stub://second"),
            Box::new(ScriptedBackend::default()),
            Box::new(Recording::default()),
            Box::new(InMemorySnapshotStore::new()),
        ))
        .unwrap();
    assert!(second.source().contains("second"));
    assert!(first_dropped.load(Ordering::SeqCst));

    let summary = watcher.close().unwrap().expect("joined");
    assert_eq!(summary.end, EndReason::Stopped);
    assert!(watcher.active().is_none());
}

#[test]
fn new_session_starts_with_cleared_timers() {
    let start = Instant::now();
    let clock = Arc::new(Mutex::new(start));
    let mut watcher = Watcher::default();

    // First session sees a fall at t=0..50 s and never reaches 60 s.
    let first = watcher
        .open(CaptureSession::new(
            config(),
            Box::new(SharedClock::new(&clock, 6)),
            Box::new(ScriptedBackend::constant(vec![person(PostureClass::Falling)])),
            Box::new(Recording::default()),
            Box::new(InMemorySnapshotStore::new()),
        ))
        .unwrap();
    let (alerts, end) = drain_until_end(first);
    assert!(alerts.is_empty());
    assert_eq!(end, EndReason::EndOfStream);

    // Second session continues the same timeline at t=60..120 s.
    let second = watcher
        .open(CaptureSession::new(
            config(),
            Box::new(SharedClock::new(&clock, 7)),
            Box::new(ScriptedBackend::constant(vec![person(PostureClass::Falling)])),
            Box::new(Recording::default()),
            Box::new(InMemorySnapshotStore::new()),
        ))
        .unwrap();
    let (alerts, end) = drain_until_end(second);
    assert_eq!(end, EndReason::EndOfStream);

    // Counted from t=60, not from the first session's t=0.
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].frame_index, 6);
    assert_eq!(
        alerts[0].event.at.duration_since(start),
        Duration::from_secs(120)
    );
}

#[test]
fn stop_returns_while_notification_is_stalled() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let session = CaptureSession::new(
        SessionConfig {
            token: token(),
            debounce: DebounceSettings {
                falling_threshold: Duration::from_secs(10),
                ..DebounceSettings::default()
            },
            max_frames: None,
        },
        stub("device:stub://cam?interval_ms=10000"),
        Box::new(ScriptedBackend::constant(vec![person(PostureClass::Falling)])),
        Box::new(Stalled {
            entered: entered_tx,
            delay: Duration::from_secs(2),
        }),
        Box::new(InMemorySnapshotStore::new()),
    );
    let mut handle = session.start().unwrap();
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let asked = Instant::now();
    let joined = handle.stop(Duration::from_millis(200)).unwrap();
    assert!(joined.is_none());
    assert!(asked.elapsed() < Duration::from_secs(1));

    // The detached thread finishes the notification, then honours the stop.
    let (alerts, end) = drain_until_end(&handle);
    assert_eq!(alerts.len(), 1);
    assert_eq!(end, EndReason::Stopped);
}
