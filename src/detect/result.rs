/// Result of running detection on a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Detections in backend output order.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Model class index (COCO ids for the bundled YOLO backend).
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// Axis-aligned box in source image pixels (top-left origin).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.w).min(other.x + other.w);
        let y1 = (self.y + self.h).min(other.y + other.h);
        let inter = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 5.0, 5.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }
}
