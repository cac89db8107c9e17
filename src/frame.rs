//! Captured frames and overlay rendering.
//!
//! - `Frame`: one RGB24 image pulled from a capture source, tagged with its
//!   index in the session and the instant it was captured.
//! - `annotate`: draws detection boxes onto an `RgbImage` for presentation.
//!
//! The capture instant is what the alert debouncer measures time against, so
//! synthetic sources can simulate long sessions without sleeping.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::time::Instant;

use crate::detect::DetectionFrame;

/// Stroke width of overlay boxes, in pixels.
pub const BOX_STROKE: u32 = 2;

/// One captured RGB24 frame.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Zero-based position of this frame within its session.
    pub index: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        index: u64,
        captured_at: Instant,
    ) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
            captured_at,
        })
    }

    /// All-black frame captured now.
    pub fn blank(width: u32, height: u32, index: u64) -> Self {
        Self {
            data: vec![0u8; (width as usize) * (height as usize) * 3],
            width,
            height,
            index,
            captured_at: Instant::now(),
        }
    }

    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Draw a box for every detection at or above `min_confidence`.
pub fn annotate(image: &mut RgbImage, detections: &DetectionFrame, min_confidence: f32) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    for det in detections.confident(min_confidence) {
        let b = det.bbox.clamped(width, height);
        draw_hollow_rect(
            image,
            b.x1.round() as u32,
            b.y1.round() as u32,
            b.x2.round() as u32,
            b.y2.round() as u32,
            Rgb(det.class.color()),
        );
    }
}

fn draw_hollow_rect(image: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let (x1, x2) = (x1.min(x2), x1.max(x2).min(width - 1));
    let (y1, y2) = (y1.min(y2), y1.max(y2).min(height - 1));
    for t in 0..BOX_STROKE {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            image.put_pixel(x, top, color);
            image.put_pixel(x, bottom, color);
        }
        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            image.put_pixel(left, y, color);
            image.put_pixel(right, y, color);
        }
    }
}
