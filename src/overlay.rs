//! Annotated frame output.
//!
//! Outlines detections and paints a small status square, then writes the
//! frame to disk so it can be watched from a browser or image viewer.

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

use crate::detect::{BoundingBox, DetectionFilter, DetectionResult};

const QUALIFYING: Rgb<u8> = Rgb([0, 255, 0]);
const OTHER: Rgb<u8> = Rgb([255, 255, 0]);
const STATUS_ON: Rgb<u8> = Rgb([0, 255, 0]);
const STATUS_OFF: Rgb<u8> = Rgb([96, 96, 96]);
const STATUS_SIZE: u32 = 16;
const BOX_THICKNESS: u32 = 2;

/// Draw detections and the actuator status onto `image`.
pub fn annotate(
    image: &mut RgbImage,
    result: &DetectionResult,
    filter: &DetectionFilter,
    actuator_on: bool,
) {
    for detection in result.iter() {
        let color = if filter.qualifies(detection) {
            QUALIFYING
        } else {
            OTHER
        };
        if let Some(bbox_px) = pixel_box(&detection.bbox, image.dimensions()) {
            draw_rect(image, bbox_px, color, BOX_THICKNESS);
        }
    }

    let status = if actuator_on { STATUS_ON } else { STATUS_OFF };
    let (w, h) = image.dimensions();
    for y in 0..STATUS_SIZE.min(h) {
        for x in 0..STATUS_SIZE.min(w) {
            image.put_pixel(x, y, status);
        }
    }
}

/// Write `image` as JPEG, replacing `path` atomically.
pub fn write_snapshot(path: &Path, image: &RgbImage) -> Result<()> {
    let tmp = path.with_extension("tmp");
    image
        .save_with_format(&tmp, ImageFormat::Jpeg)
        .with_context(|| format!("write annotated frame {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replace annotated frame {}", path.display()))?;
    Ok(())
}

/// Clamp a box into inclusive pixel corners `[x0, y0, x1, y1]`.
fn pixel_box(bbox: &BoundingBox, (w, h): (u32, u32)) -> Option<[u32; 4]> {
    if w == 0 || h == 0 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(bbox.x, w);
    let y0 = clamp(bbox.y, h);
    let x1 = clamp(bbox.x + bbox.w, w);
    let y1 = clamp(bbox.y + bbox.h, h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

fn draw_rect(img: &mut RgbImage, bbox_px: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    #[test]
    fn outlines_detections_by_qualification() {
        let mut image = RgbImage::new(64, 64);
        let result = DetectionResult::new(vec![
            Detection::new(67, 0.9, BoundingBox::new(20.0, 20.0, 10.0, 10.0)),
            Detection::new(1, 0.9, BoundingBox::new(40.0, 40.0, 10.0, 10.0)),
        ]);
        let filter = DetectionFilter::new([67], 0.5);
        annotate(&mut image, &result, &filter, false);

        assert_eq!(*image.get_pixel(20, 25), QUALIFYING);
        assert_eq!(*image.get_pixel(40, 45), OTHER);
        assert_eq!(*image.get_pixel(25, 25), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), STATUS_OFF);
    }

    #[test]
    fn boxes_outside_the_frame_are_clamped() {
        let mut image = RgbImage::new(32, 32);
        let result = DetectionResult::new(vec![Detection::new(
            0,
            1.0,
            BoundingBox::new(-5.0, -5.0, 100.0, 100.0),
        )]);
        annotate(&mut image, &result, &DetectionFilter::new(Vec::new(), 0.0), true);
        assert_eq!(*image.get_pixel(31, 31), QUALIFYING);
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), STATUS_ON);
    }

    #[test]
    fn snapshot_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.jpg");
        write_snapshot(&path, &RgbImage::new(4, 4)).unwrap();
        write_snapshot(&path, &RgbImage::new(6, 6)).unwrap();
        let reread = image::open(&path).unwrap();
        assert_eq!(reread.width(), 6);
        assert!(!path.with_extension("tmp").exists());
    }
}
