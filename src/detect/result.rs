/// Default confidence floor. Detections below it never count toward an alert.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Posture classes produced by the model.
///
/// The numeric ids match the class order of the trained model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PostureClass {
    Sitting,
    Standing,
    Falling,
}

impl PostureClass {
    /// Map a model class id to a posture. Unknown ids are discarded.
    pub fn from_class_id(id: usize) -> Option<Self> {
        match id {
            0 => Some(Self::Sitting),
            1 => Some(Self::Standing),
            2 => Some(Self::Falling),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sitting => "Sitting",
            Self::Standing => "Standing",
            Self::Falling => "Falling",
        }
    }

    /// Overlay colour (RGB).
    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::Sitting => [0, 255, 0],
            Self::Standing => [0, 0, 255],
            Self::Falling => [255, 0, 0],
        }
    }
}

/// Bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp the box into a `width` x `height` frame.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        Self {
            x1: self.x1.clamp(0.0, max_x),
            y1: self.y1.clamp(0.0, max_y),
            x2: self.x2.clamp(0.0, max_x),
            y2: self.y2.clamp(0.0, max_y),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: PostureClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: PostureClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    pub fn is_confident(&self, min_confidence: f32) -> bool {
        self.confidence >= min_confidence
    }
}

impl std::fmt::Display for Detection {
    /// Class label and confidence, e.g. `Falling 0.91`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.2}", self.class.label(), self.confidence)
    }
}

/// All detections produced from one video frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionFrame {
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Detections at or above `min_confidence`.
    pub fn confident(&self, min_confidence: f32) -> impl Iterator<Item = &Detection> + '_ {
        self.detections
            .iter()
            .filter(move |d| d.is_confident(min_confidence))
    }

    /// True when a confident detection of `class` is present.
    pub fn contains(&self, class: PostureClass, min_confidence: f32) -> bool {
        self.confident(min_confidence).any(|d| d.class == class)
    }
}

impl From<Vec<Detection>> for DetectionFrame {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: PostureClass, confidence: f32) -> Detection {
        Detection::new(class, confidence, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn class_ids_follow_model_order() {
        assert_eq!(PostureClass::from_class_id(0), Some(PostureClass::Sitting));
        assert_eq!(PostureClass::from_class_id(1), Some(PostureClass::Standing));
        assert_eq!(PostureClass::from_class_id(2), Some(PostureClass::Falling));
        assert_eq!(PostureClass::from_class_id(3), None);
    }

    #[test]
    fn detection_displays_label_and_confidence() {
        assert_eq!(det(PostureClass::Falling, 0.912).to_string(), "Falling 0.91");
        assert_eq!(det(PostureClass::Sitting, 0.5).to_string(), "Sitting 0.50");
    }

    #[test]
    fn confidence_floor_is_inclusive() {
        let frame = DetectionFrame::new(vec![
            det(PostureClass::Sitting, 0.5),
            det(PostureClass::Falling, 0.49999),
        ]);
        assert!(frame.contains(PostureClass::Sitting, DEFAULT_MIN_CONFIDENCE));
        assert!(!frame.contains(PostureClass::Falling, DEFAULT_MIN_CONFIDENCE));
        assert_eq!(frame.confident(DEFAULT_MIN_CONFIDENCE).count(), 1);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let b = BoundingBox::new(-5.0, 3.0, 700.0, 500.0).clamped(640, 480);
        assert_eq!(b, BoundingBox::new(0.0, 3.0, 639.0, 479.0));
    }
}
