//! fallwatch - Posture alerts from a camera or video file
//!
//! `watch` runs one capture session:
//! 1. Opens the chosen camera (or any source spec)
//! 2. Runs posture detection on every frame
//! 3. Sends a notification when someone sits for 5 minutes or lies fallen for 1 minute
//! 4. Stores the frame of every fall alert under the snapshot directory
//!
//! `test-notify` sends a test message to check the token.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use fall_watch::{
    open_source, send_test_notification, CaptureSession, DetectorBackend, DirectorySnapshotStore,
    FallWatchConfig, LineNotifier, NotifyToken, SessionConfig, SessionEvent, SourceSpec, Watcher,
};

const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Sitting and fall alerts from a camera feed")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a camera or video file and send alerts.
    Watch {
        /// Configured camera number (1 = first camera in the config).
        #[arg(long, default_value_t = 1, conflicts_with = "source")]
        camera: usize,

        /// Source spec instead of a configured camera (`device:0`, a file path, `stub://...`).
        #[arg(long)]
        source: Option<String>,

        /// Notification service token.
        #[arg(long, env = "FALLWATCH_NOTIFY_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// Send a test notification.
    TestNotify {
        /// Notification service token.
        #[arg(long, env = "FALLWATCH_NOTIFY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = FallWatchConfig::load()?;

    match args.command {
        Command::Watch {
            camera,
            source,
            token,
            max_frames,
        } => {
            let spec = match source {
                Some(spec) => spec.parse::<SourceSpec>()?,
                None => config.camera(camera)?.clone(),
            };
            watch(&config, spec, NotifyToken::new(token.unwrap_or_default()), max_frames)
        }
        Command::TestNotify { token } => {
            let notifier = LineNotifier::new(&config.notify.endpoint, config.notify.timeout)?;
            let token = NotifyToken::new(token.unwrap_or_default());
            send_test_notification(&notifier, &token)?;
            println!("test notification sent to {}", notifier.endpoint());
            Ok(())
        }
    }
}

fn watch(
    config: &FallWatchConfig,
    spec: SourceSpec,
    token: NotifyToken,
    max_frames: Option<u64>,
) -> Result<()> {
    let source = open_source(&spec, config.capture)?;
    let detector = build_detector(config, &spec)?;
    let notifier = LineNotifier::new(&config.notify.endpoint, config.notify.timeout)?;
    let snapshots = DirectorySnapshotStore::new(&config.snapshot_dir)?;
    log::info!("fall snapshots go to {}", snapshots.dir().display());

    let session = CaptureSession::new(
        SessionConfig {
            token,
            debounce: config.debounce_settings(),
            max_frames,
        },
        source,
        detector,
        Box::new(notifier),
        Box::new(snapshots),
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("set Ctrl-C handler")?;

    let mut watcher = Watcher::default();
    let handle = watcher.open(session)?;
    println!("watching {} (Ctrl-C to stop)", handle.source());

    loop {
        if shutdown_rx.try_recv().is_ok() {
            log::info!("shutdown signal received");
            break;
        }
        while let Ok(frame) = handle.frames().try_recv() {
            log::debug!(
                "frame #{}: {} detections",
                frame.index,
                frame.detections.len()
            );
        }
        match handle.events().recv_timeout(EVENT_POLL) {
            Ok(SessionEvent::Alert(report)) => {
                println!(
                    "{}",
                    fall_watch::alert_message(report.event.condition)
                );
                if let Some(path) = report.snapshot {
                    println!("  snapshot: {}", path.display());
                }
            }
            Ok(SessionEvent::Ended(reason)) => {
                println!("session ended: {:?}", reason);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(summary) = watcher.close()? {
        println!(
            "processed {} frames ({} not displayed), {} alerts",
            summary.frames_processed,
            summary.frames_dropped,
            summary.alerts.len()
        );
    }
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn build_detector(config: &FallWatchConfig, _spec: &SourceSpec) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = fall_watch::TractBackend::new(&config.model_path, 640)
        .with_context(|| format!("load model {}", config.model_path.display()))?
        .with_threshold(config.min_confidence);
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_detector(_config: &FallWatchConfig, spec: &SourceSpec) -> Result<Box<dyn DetectorBackend>> {
    if spec.is_stub() {
        log::warn!("no detector backend compiled in; stub source runs with empty detections");
        return Ok(Box::new(fall_watch::ScriptedBackend::default()));
    }
    Err(anyhow::anyhow!(
        "posture detection requires the backend-tract feature"
    ))
}
