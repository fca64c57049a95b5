//! Encoded frame container.
//!
//! - `Frame`: one complete JPEG image cut out of the MJPEG byte stream.
//! - `decode`: turns a `Frame` into an RGB image for the detector.
//!
//! Frames are immutable once extracted. The demuxer hands ownership to the
//! pipeline, which decodes the frame and drops it within one iteration.

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// A complete encoded JPEG frame, SOI through EOI inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap bytes that are already known to be bounded by SOI/EOI.
    pub(crate) fn from_marked(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.starts_with(&SOI) && bytes.ends_with(&EOI));
        Self { bytes }
    }

    /// Build a frame from arbitrary bytes, checking the marker bounds.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < SOI.len() + EOI.len() {
            return Err(anyhow!("frame too short ({} bytes)", bytes.len()));
        }
        if !bytes.starts_with(&SOI) {
            return Err(anyhow!("frame does not start with a JPEG SOI marker"));
        }
        if !bytes.ends_with(&EOI) {
            return Err(anyhow!("frame does not end with a JPEG EOI marker"));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the JPEG payload into an RGB image.
    pub fn decode(&self) -> Result<RgbImage> {
        let image = image::load_from_memory_with_format(&self.bytes, ImageFormat::Jpeg)
            .context("decode jpeg")?;
        Ok(image.into_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};
    use std::io::Cursor;

    /// Encode a solid-colour JPEG for use as a stream fixture.
    fn encode_test_jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([shade, shade / 2, 255 - shade]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .expect("encode jpeg");
        out.into_inner()
    }

    #[test]
    fn new_rejects_unmarked_bytes() {
        assert!(Frame::new(vec![0xFF, 0xD8]).is_err());
        assert!(Frame::new(vec![0x00, 0xD8, 0xFF, 0xD9]).is_err());
        assert!(Frame::new(vec![0xFF, 0xD8, 0xFF, 0x00]).is_err());
        assert!(Frame::new(vec![0xFF, 0xD8, 0xFF, 0xD9]).is_ok());
    }

    #[test]
    fn decode_round_trips_dimensions() {
        let frame = Frame::new(encode_test_jpeg(16, 8, 40)).unwrap();
        let rgb = frame.decode().unwrap();
        assert_eq!(rgb.dimensions(), (16, 8));
    }

    #[test]
    fn decode_fails_on_corrupt_payload() {
        let frame = Frame::new(vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]).unwrap();
        assert!(frame.decode().is_err());
    }
}
