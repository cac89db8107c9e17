use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionFrame};
use crate::frame::Frame;

/// Scripted backend for tests and demos.
///
/// Replays a queue of per-frame detection lists, one entry per `infer` call.
/// Once the script runs out it returns empty frames, or keeps repeating the
/// final entry when built with [`ScriptedBackend::repeat_last`].
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: VecDeque<Vec<Detection>>,
    last: Option<Vec<Detection>>,
    repeat_last: bool,
    frames_seen: u64,
}

impl ScriptedBackend {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Vec<Detection>>,
    {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Backend that reports the same detections on every frame.
    pub fn constant(detections: Vec<Detection>) -> Self {
        Self::new([detections]).repeat_last()
    }

    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<DetectionFrame> {
        self.frames_seen += 1;
        let detections = match self.script.pop_front() {
            Some(next) => {
                if self.repeat_last {
                    self.last = Some(next.clone());
                }
                next
            }
            None if self.repeat_last => self.last.clone().unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(DetectionFrame::new(detections))
    }
}
