use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};

enum Scripted {
    Result(DetectionResult),
    Error(String),
}

/// Stub backend for testing and dry runs.
///
/// Replays a scripted sequence of results, one per `detect` call, then
/// reports nothing. With an empty script it never detects anything, which
/// lets the pipeline run against a live stream without a model.
#[derive(Default)]
pub struct StubBackend {
    script: VecDeque<Scripted>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stub that reports one full-frame detection of `class_id`
    /// for each `true` and nothing for each `false`.
    pub fn from_presence(class_id: u32, confidence: f32, presence: &[bool]) -> Self {
        let mut stub = Self::new();
        for &present in presence {
            if present {
                stub.push(DetectionResult::new(vec![Detection::new(
                    class_id,
                    confidence,
                    BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                )]));
            } else {
                stub.push(DetectionResult::default());
            }
        }
        stub
    }

    pub fn push(&mut self, result: DetectionResult) {
        self.script.push_back(Scripted::Result(result));
    }

    /// Queue a failing call.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.script.push_back(Scripted::Error(message.into()));
    }

    /// Number of `detect` calls served.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<DetectionResult> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Scripted::Result(result)) => Ok(result),
            Some(Scripted::Error(message)) => Err(anyhow!(message)),
            None => Ok(DetectionResult::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_reports_nothing() {
        let mut backend = StubBackend::from_presence(67, 0.9, &[true, false]);
        backend.push_error("boom");
        let image = RgbImage::new(2, 2);

        let r1 = backend.detect(&image).unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1.detections[0].class_id, 67);

        assert!(backend.detect(&image).unwrap().is_empty());
        assert!(backend.detect(&image).is_err());
        assert!(backend.detect(&image).unwrap().is_empty());
        assert_eq!(backend.calls(), 4);
    }
}
