//! Decoded video frame

use crate::error::{LakshyaError, Result};
use image::{ImageFormat, Rgb, RgbImage};

/// A decoded 8-bit RGB image.
///
/// The pixel data is owned; nothing aliases the extractor's buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode a complete JPEG byte range.
    pub fn decode_jpeg(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| LakshyaError::Decode(format!("{} ({} bytes)", e, bytes.len())))?;
        Ok(Self::new(decoded.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel at (x, y), or None outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}
