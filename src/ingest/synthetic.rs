//! Synthetic `stub://` source.
//!
//! Location syntax: `stub://<name>[?frames=N][&interval_ms=M]`.
//! - `frames`: end the stream after N frames (unbounded when absent).
//! - `interval_ms`: stamp frame k at `connect + k * M` instead of the wall
//!   clock, so long sessions can be replayed instantly.
//!
//! Without `interval_ms` frames are paced in real time at the target fps.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use url::Url;

use super::{CaptureSettings, FrameSource, SourceStats, STUB_SCHEME};
use crate::frame::Frame;

pub struct SyntheticSource {
    location: String,
    width: u32,
    height: u32,
    max_frames: Option<u64>,
    interval: Option<Duration>,
    pace: Option<Duration>,
    base: Option<Instant>,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn from_location(location: &str, settings: CaptureSettings) -> Result<Self> {
        let CaptureSettings {
            target_fps,
            width,
            height,
        } = settings;
        if !location.starts_with(STUB_SCHEME) {
            return Err(anyhow!("synthetic source needs a {} location", STUB_SCHEME));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic frame size must be non-zero"));
        }
        let url = Url::parse(location).with_context(|| format!("parse {}", location))?;
        let mut max_frames = None;
        let mut interval = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => {
                    max_frames = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| anyhow!("frames must be an integer"))?,
                    )
                }
                "interval_ms" => {
                    interval = Some(Duration::from_millis(
                        value
                            .parse::<u64>()
                            .map_err(|_| anyhow!("interval_ms must be an integer"))?,
                    ))
                }
                other => log::warn!("SyntheticSource: ignoring unknown option '{}'", other),
            }
        }
        Ok(Self {
            location: location.to_string(),
            width,
            height,
            max_frames,
            interval,
            pace: (interval.is_none() && target_fps > 0)
                .then(|| Duration::from_millis(1000 / target_fps as u64)),
            base: None,
            frame_count: 0,
            scene_state: 0,
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.location)
    }

    fn connect(&mut self) -> Result<()> {
        self.base = Some(Instant::now());
        log::info!("SyntheticSource: connected to {}", self.location);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let base = self
            .base
            .ok_or_else(|| anyhow!("synthetic source not connected"))?;
        if self.max_frames.is_some_and(|max| self.frame_count >= max) {
            return Ok(None);
        }

        let index = self.frame_count;
        let captured_at = match (self.interval, self.pace) {
            (Some(step), _) => u32::try_from(index)
                .ok()
                .and_then(|k| step.checked_mul(k))
                .and_then(|offset| base.checked_add(offset))
                .ok_or_else(|| anyhow!("simulated clock overflows at frame {}", index))?,
            (None, Some(pace)) => {
                std::thread::sleep(pace);
                Instant::now()
            }
            (None, None) => Instant::now(),
        };
        let pixels = self.generate_pixels();
        self.frame_count += 1;

        Frame::new(pixels, self.width, self.height, index, captured_at).map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.base.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.location.clone(),
        }
    }
}
