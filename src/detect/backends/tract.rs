#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{
    BoundingBox, Detection, DetectionFrame, PostureClass, DEFAULT_MIN_CONFIDENCE,
};
use crate::frame::Frame;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for a YOLOv8 posture model exported to ONNX.
///
/// Expects an input of `1x3xSxS` (RGB, 0..1) and an output of `1x(4+C)xN`
/// where each of the `N` columns is `(cx, cy, w, h, score_0 .. score_C)` in
/// input pixel space.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: DEFAULT_MIN_CONFIDENCE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let side = self.input_size;
        let resized = imageops::resize(&frame.to_image()?, side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not rank 3")?;
        let (_, rows, anchors) = view.dim();
        if rows < 5 {
            return Err(anyhow!("model output has {} rows, expected at least 5", rows));
        }

        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;
        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (4..rows)
                .map(|r| (r - 4, view[[0, r, i]]))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let Some(class) = PostureClass::from_class_id(class_id) else {
                continue;
            };
            let cx = view[[0, 0, i]];
            let cy = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            let bbox = BoundingBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            )
            .clamped(frame.width, frame.height);
            candidates.push(Detection::new(class, score, bbox));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Greedy per-class NMS. Highest score wins.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class == cand.class && k.bbox.iou(&cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<DetectionFrame> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        Ok(DetectionFrame::new(self.decode(outputs, frame)?))
    }

    fn warm_up(&mut self) -> Result<()> {
        let frame = Frame::blank(self.input_size, self.input_size, 0);
        self.infer(&frame).map(|_| ())
    }
}
