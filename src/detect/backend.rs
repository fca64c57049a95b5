use anyhow::Result;
use image::RgbImage;

use crate::detect::result::DetectionResult;

/// Detector backend trait.
///
/// The pipeline treats a backend as an opaque classifier: one decoded RGB
/// frame in, zero or more class-tagged detections out. Filtering by class
/// and confidence happens afterwards in `DetectionFilter`, so backends may
/// return everything they find.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Called once per frame from the pipeline loop. An error skips the frame.
    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
