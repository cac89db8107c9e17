//! Local file frame source.
//!
//! This module provides `FileSource` for reading frames from a local video file.
//! The file source is responsible for:
//! - Decoding video frames in-memory (feature: ingest-file-ffmpeg)
//! - Stamping each frame with its capture instant
//! - Reporting end-of-stream when the file runs out
//!
//! Remote URLs are rejected; only local paths and `stub://` names are accepted.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::SyntheticSource;
use super::{CaptureSettings, FrameSource, SourceStats, STUB_SCHEME};
use crate::frame::Frame;

const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "test/Human Fall Detection Sample.mp4").
    pub path: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 10,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with(STUB_SCHEME) {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::from_location(
                    &config.path,
                    CaptureSettings {
                        target_fps: config.target_fps,
                        width: SYNTHETIC_WIDTH,
                        height: SYNTHETIC_HEIGHT,
                    },
                )?),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.describe(),
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}
