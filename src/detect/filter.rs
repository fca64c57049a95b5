use std::collections::BTreeSet;

use crate::detect::result::{Detection, DetectionResult};

/// Decides which detections count as "target present".
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionFilter {
    allowed_classes: BTreeSet<u32>,
    min_confidence: f32,
}

impl DetectionFilter {
    /// An empty `allowed_classes` accepts every class.
    pub fn new(allowed_classes: impl IntoIterator<Item = u32>, min_confidence: f32) -> Self {
        Self {
            allowed_classes: allowed_classes.into_iter().collect(),
            min_confidence,
        }
    }

    pub fn allowed_classes(&self) -> &BTreeSet<u32> {
        &self.allowed_classes
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn qualifies(&self, detection: &Detection) -> bool {
        let class_ok =
            self.allowed_classes.is_empty() || self.allowed_classes.contains(&detection.class_id);
        class_ok && detection.confidence >= self.min_confidence
    }

    pub fn count(&self, result: &DetectionResult) -> usize {
        result.iter().filter(|d| self.qualifies(d)).count()
    }

    /// True iff at least one detection qualifies.
    pub fn is_present(&self, result: &DetectionResult) -> bool {
        result.iter().any(|d| self.qualifies(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn det(class_id: u32, confidence: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::default())
    }

    #[test]
    fn filters_by_class_and_confidence() {
        let filter = DetectionFilter::new([67], 0.4);
        assert!(filter.qualifies(&det(67, 0.4)));
        assert!(!filter.qualifies(&det(67, 0.39)));
        assert!(!filter.qualifies(&det(0, 0.99)));

        let result = DetectionResult::new(vec![det(0, 0.9), det(67, 0.2), det(67, 0.8)]);
        assert!(filter.is_present(&result));
        assert_eq!(filter.count(&result), 1);
    }

    #[test]
    fn empty_allow_list_accepts_any_class() {
        let filter = DetectionFilter::new(Vec::new(), 0.5);
        assert!(filter.qualifies(&det(3, 0.5)));
        assert!(!filter.is_present(&DetectionResult::default()));
    }
}
