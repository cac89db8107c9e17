//! V4L2 camera source.
//!
//! This module provides `V4l2Source` for capturing frames from local V4L2
//! devices (e.g., /dev/video0), with a synthetic fallback for `stub://` paths.
//! Frames are requested as RGB24 at the configured size; with libv4l the
//! conversion is done in userspace for most webcams. Devices that stay on
//! YUYV are converted here. Any other format fails to connect.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::synthetic::SyntheticSource;
use super::{CaptureSettings, FrameSource, SourceStats, STUB_SCHEME};
use crate::frame::Frame;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// V4L2 frame source.
pub struct V4l2Source {
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticSource),
    Device(DeviceV4l2Source),
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if config.device.starts_with(STUB_SCHEME) {
            Ok(Self {
                backend: V4l2Backend::Synthetic(SyntheticSource::from_location(
                    &config.device,
                    CaptureSettings {
                        target_fps: config.target_fps,
                        width: config.width,
                        height: config.height,
                    },
                )?),
            })
        } else {
            Ok(Self {
                backend: V4l2Backend::Device(DeviceV4l2Source::new(config)),
            })
        }
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.describe(),
            V4l2Backend::Device(source) => format!("{} (v4l2)", source.config.device),
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.connect(),
            V4l2Backend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.next_frame(),
            V4l2Backend::Device(source) => source.next_frame().map(Some),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.is_healthy(),
            V4l2Backend::Device(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.stats(),
            V4l2Backend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelFormat {
    Rgb24,
    Yuyv,
}

impl PixelFormat {
    fn from_fourcc(fourcc: v4l::FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Yuyv => 2,
        }
    }
}

struct DeviceV4l2Source {
    config: V4l2Config,
    state: Option<DeviceV4l2State>,
    pixel_format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceV4l2Source {
    fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            pixel_format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} offers neither RGB24 nor YUYV capture (got {:?})",
                self.config.device,
                format.fourcc
            )
        })?;
        if self.pixel_format == PixelFormat::Yuyv {
            log::warn!(
                "V4l2Source: {} delivers YUYV; converting to RGB24",
                self.config.device
            );
        }

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{})",
            self.config.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let frame_len = (self.active_width as usize)
            * (self.active_height as usize)
            * self.pixel_format.bytes_per_pixel();
        let raw = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, _meta)| buf[..buf.len().min(frame_len)].to_vec())
            })
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;
        let pixels = match self.pixel_format {
            PixelFormat::Rgb24 => raw,
            PixelFormat::Yuyv => yuyv_to_rgb(&raw),
        };

        let index = self.frame_count;
        self.frame_count += 1;
        let now = Instant::now();
        self.last_frame_at = Some(now);

        Frame::new(pixels, self.active_width, self.active_height, index, now)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

/// Convert packed YUYV 4:2:2 to RGB24 (BT.601, limited range).
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for chunk in yuyv.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}
