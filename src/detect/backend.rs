use anyhow::Result;

use crate::detect::result::DetectionFrame;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one RGB frame into zero or more posture detections.
/// Ordering of the returned detections is not significant.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a frame.
    fn infer(&mut self, frame: &Frame) -> Result<DetectionFrame>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
