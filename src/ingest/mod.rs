//! Frame capture sources.
//!
//! This module provides the sources a watch session can read from:
//! - Local camera devices (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources (always available, used by tests and demos)
//!
//! Every source yields `Frame`s until it reports end-of-stream with `Ok(None)`.
//! A source that cannot be opened fails in `connect`, before any session starts.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource};
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

pub const STUB_SCHEME: &str = "stub://";

/// A producer of frames for one session.
pub trait FrameSource: Send {
    /// Human-readable source name for logs.
    fn describe(&self) -> String;

    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Capture parameters shared by all sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// What to open: a camera device or a video file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Device path (`/dev/video0`) or `stub://` name.
    Device(String),
    /// Local file path or `stub://` name.
    File(String),
}

impl SourceSpec {
    pub fn location(&self) -> &str {
        match self {
            Self::Device(loc) | Self::File(loc) => loc,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.location().starts_with(STUB_SCHEME)
    }
}

impl FromStr for SourceSpec {
    type Err = anyhow::Error;

    /// `device:<index>`, `device:<path>` or a plain file path.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("empty source spec"));
        }
        match s.strip_prefix("device:") {
            Some(rest) => {
                let rest = rest.trim();
                if rest.is_empty() {
                    return Err(anyhow!("device source needs an index or path"));
                }
                match rest.parse::<u32>() {
                    Ok(index) => Ok(Self::Device(format!("/dev/video{}", index))),
                    Err(_) => Ok(Self::Device(rest.to_string())),
                }
            }
            None => Ok(Self::File(s.to_string())),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(loc) => write!(f, "device:{}", loc),
            Self::File(loc) => f.write_str(loc),
        }
    }
}

/// Build an unconnected source for `spec`.
pub fn open_source(spec: &SourceSpec, settings: CaptureSettings) -> Result<Box<dyn FrameSource>> {
    match spec {
        SourceSpec::File(path) => Ok(Box::new(FileSource::new(FileConfig {
            path: path.clone(),
            target_fps: settings.target_fps,
        })?)),
        SourceSpec::Device(device) => open_device(device, settings),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: &str, settings: CaptureSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(V4l2Config {
        device: device.to_string(),
        target_fps: settings.target_fps,
        width: settings.width,
        height: settings.height,
    })?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: &str, settings: CaptureSettings) -> Result<Box<dyn FrameSource>> {
    if device.starts_with(STUB_SCHEME) {
        return Ok(Box::new(SyntheticSource::from_location(device, settings)?));
    }
    Err(anyhow!(
        "camera capture of {} requires the ingest-v4l2 feature",
        device
    ))
}
