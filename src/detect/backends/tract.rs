#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};

const LETTERBOX_FILL: f32 = 144.0 / 255.0;
const BOX_CHANNELS: usize = 4;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a `[1, 3, S, S]` float input and a `[1, 4 + classes, anchors]`
/// output where the first four rows are `cx, cy, w, h` in input pixels and
/// the remaining rows are per-class scores. The model file is loaded once;
/// inference does no I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_floor: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        if input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_floor: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Drop candidates below this score before NMS.
    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = floor;
        self
    }

    pub fn with_iou_threshold(mut self, iou: f32) -> Self {
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Result<(Tensor, f32)> {
        let (w0, h0) = image.dimensions();
        if w0 == 0 || h0 == 0 {
            return Err(anyhow!("cannot run inference on an empty {}x{} frame", w0, h0));
        }
        let size = self.input_size;
        let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
        let w1 = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
        let h1 = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
        let resized = image::imageops::resize(image, w1, h1, FilterType::Triangle);

        let side = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let (x, y) = (x as u32, y as u32);
            if x < w1 && y < h1 {
                resized.get_pixel(x, y)[c] as f32 / 255.0
            } else {
                LETTERBOX_FILL
            }
        });

        Ok((input.into_tensor(), ratio))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult> {
        let (input, ratio) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let preds: Vec<f32> = view.iter().copied().collect();
        let mut detections = decode_predictions(
            &preds,
            shape[1],
            shape[2],
            ratio,
            self.confidence_floor,
            image.dimensions(),
        )?;
        non_max_suppression(&mut detections, self.iou_threshold);
        Ok(DetectionResult::new(detections))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank).map(|_| ())
    }
}

/// Decode a row-major `[channels, anchors]` prediction block.
fn decode_predictions(
    preds: &[f32],
    channels: usize,
    anchors: usize,
    ratio: f32,
    confidence_floor: f32,
    (width, height): (u32, u32),
) -> Result<Vec<Detection>> {
    if channels <= BOX_CHANNELS {
        return Err(anyhow!(
            "model output has {} channels; expected box plus class scores",
            channels
        ));
    }
    if preds.len() != channels * anchors {
        return Err(anyhow!(
            "prediction block has {} values, expected {}",
            preds.len(),
            channels * anchors
        ));
    }
    let (width, height) = (width as f32, height as f32);
    let at = |row: usize, anchor: usize| preds[row * anchors + anchor];

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (BOX_CHANNELS..channels)
            .map(|row| (row - BOX_CHANNELS, at(row, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if confidence < confidence_floor {
            continue;
        }

        let cx = at(0, anchor) / ratio;
        let cy = at(1, anchor) / ratio;
        let w = at(2, anchor) / ratio;
        let h = at(3, anchor) / ratio;
        let x = (cx - w / 2.0).clamp(0.0, width);
        let y = (cy - h / 2.0).clamp(0.0, height);
        detections.push(Detection::new(
            class_id as u32,
            confidence,
            BoundingBox::new(x, y, w.min(width - x), h.min(height - y)),
        ));
    }
    Ok(detections)
}

/// Greedy per-class NMS, highest confidence first. A box is only
/// suppressed by a kept box of the same class.
fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let overlaps = (0..kept).any(|prev| {
            detections[prev].class_id == detections[index].class_id
                && detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold
        });
        if !overlaps {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionFilter;

    /// Two anchors, two classes: rows are cx, cy, w, h, score0, score1.
    fn block() -> Vec<f32> {
        vec![
            20.0, 60.0, // cx
            20.0, 60.0, // cy
            10.0, 10.0, // w
            10.0, 10.0, // h
            0.1, 0.9, // class 0
            0.8, 0.05, // class 1
        ]
    }

    #[test]
    fn decodes_best_class_per_anchor() {
        let dets = decode_predictions(&block(), 6, 2, 1.0, 0.25, (100, 100)).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!(dets[0].bbox, BoundingBox::new(15.0, 15.0, 10.0, 10.0));
        assert_eq!(dets[1].class_id, 0);
    }

    #[test]
    fn rescales_by_letterbox_ratio_and_applies_floor() {
        let dets = decode_predictions(&block(), 6, 2, 2.0, 0.85, (100, 100)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(27.5, 27.5, 5.0, 5.0));
    }

    #[test]
    fn rejects_malformed_blocks() {
        assert!(decode_predictions(&[0.0; 8], 4, 2, 1.0, 0.1, (10, 10)).is_err());
        assert!(decode_predictions(&[0.0; 5], 6, 2, 1.0, 0.1, (10, 10)).is_err());
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let mut dets = vec![
            Detection::new(0, 0.6, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new(0, 0.9, BoundingBox::new(1.0, 1.0, 10.0, 10.0)),
            Detection::new(1, 0.7, BoundingBox::new(50.0, 50.0, 10.0, 10.0)),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
        assert!((dets[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_other_classes() {
        let mut dets = vec![
            Detection::new(67, 0.6, BoundingBox::new(1.0, 0.0, 10.0, 10.0)),
            Detection::new(0, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[1].class_id, 67);

        let filter = DetectionFilter::new([67], 0.4);
        assert!(filter.is_present(&DetectionResult::new(dets)));
    }
}
