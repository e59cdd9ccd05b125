//! Colour blob detector

use super::mask::{self, rgb_to_hsv};
use super::{DetectorKind, INFO_AREA, INFO_AREA_RATIO, TargetDetector, TargetObservation};
use crate::config::ColorTrackingConfig;
use crate::stream::Frame;

/// Half-width of the range built by [`HsvRange::around`]
pub const CALIBRATION_TOLERANCE: [u8; 3] = [10, 50, 50];

/// Highest hue value in the 8-bit convention
pub const HUE_MAX: u8 = 179;

/// Inclusive HSV bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Range of ±[`CALIBRATION_TOLERANCE`] around a sampled value,
    /// clamped to H in 0..=179 and S, V in 0..=255.
    pub fn around(hsv: [u8; 3]) -> Self {
        let max = [HUE_MAX, u8::MAX, u8::MAX];
        let mut lower = [0u8; 3];
        let mut upper = [0u8; 3];
        for c in 0..3 {
            let tol = CALIBRATION_TOLERANCE[c];
            lower[c] = hsv[c].saturating_sub(tol);
            upper[c] = hsv[c].saturating_add(tol).min(max[c]);
        }
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

/// Finds the largest blob inside an HSV range.
///
/// Pipeline: threshold, 5x5 open, 5x5 close, 8-connected components.
/// Area is measured inside each blob's outer boundary, so holes from glare
/// or a hollow target do not shrink it.
pub struct ColorDetector {
    range: HsvRange,
    min_area: u32,
}

impl ColorDetector {
    pub fn new(range: HsvRange, min_area: u32) -> Self {
        Self { range, min_area }
    }

    pub fn from_config(config: &ColorTrackingConfig) -> Self {
        Self::new(config.hsv_range(), config.min_contour_area)
    }

    pub fn range(&self) -> HsvRange {
        self.range
    }

    pub fn set_range(&mut self, range: HsvRange) {
        tracing::info!(
            "Colour range set to {:?}..={:?}",
            range.lower,
            range.upper
        );
        self.range = range;
    }

    /// Re-centre the range on the colour at the middle of `frame`.
    ///
    /// Returns the sampled HSV value, or None for an empty frame.
    pub fn recalibrate(&mut self, frame: &Frame) -> Option<[u8; 3]> {
        let hsv = sample_center_hsv(frame)?;
        self.set_range(HsvRange::around(hsv));
        Some(hsv)
    }
}

/// HSV value of the centre pixel
pub fn sample_center_hsv(frame: &Frame) -> Option<[u8; 3]> {
    frame
        .pixel(frame.width() / 2, frame.height() / 2)
        .map(rgb_to_hsv)
}

impl TargetDetector for ColorDetector {
    fn detect(&mut self, frame: &Frame) -> TargetObservation {
        let raw = mask::in_range(frame.image(), self.range.lower, self.range.upper);
        let cleaned = mask::close(&mask::open(&raw));

        let Some(blob) = mask::largest_blob(&cleaned) else {
            return TargetObservation::not_found();
        };
        if blob.area < self.min_area {
            tracing::trace!(
                area = blob.area,
                pixels = blob.pixels,
                "Largest blob below minimum area"
            );
            return TargetObservation::not_found();
        }

        let (cx, cy) = blob.centroid();
        let area = blob.area as f32;
        let frame_area = (frame.width() as f32) * (frame.height() as f32);

        TargetObservation::found(cx, cy, area)
            .with_info(INFO_AREA, area)
            .with_info(INFO_AREA_RATIO, area / frame_area)
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Color
    }
}
