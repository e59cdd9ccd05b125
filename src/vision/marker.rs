//! Fiducial marker detector
//!
//! Marker finding and decoding is delegated to a [`MarkerRecognizer`]; this
//! module turns its quadrilaterals into a [`TargetObservation`] with a
//! pinhole-model distance estimate.

use super::{DetectorKind, INFO_MARKER_ID, INFO_MARKER_WIDTH, TargetDetector, TargetObservation};
use crate::config::ArucoConfig;
use crate::error::{LakshyaError, Result};
use crate::stream::Frame;
use std::fmt;
use std::str::FromStr;

/// Image point (x, y) in pixels
pub type Point = [f32; 2];

/// One recognised marker.
///
/// Corners run clockwise from top-left: 0 top-left, 1 top-right,
/// 2 bottom-right, 3 bottom-left.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDetection {
    pub id: i32,
    pub corners: [Point; 4],
}

impl MarkerDetection {
    pub fn new(id: i32, corners: [Point; 4]) -> Self {
        Self { id, corners }
    }

    /// Mean of the four corners
    pub fn center(&self) -> Point {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), [x, y]| (sx + x, sy + y));
        [sx / 4.0, sy / 4.0]
    }

    /// Average length of the top (0-1) and bottom (2-3) edges
    pub fn perceived_width(&self) -> f32 {
        let top = edge_length(self.corners[0], self.corners[1]);
        let bottom = edge_length(self.corners[2], self.corners[3]);
        (top + bottom) / 2.0
    }
}

fn edge_length(a: Point, b: Point) -> f32 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

/// Pinhole approximation: `real_size * focal_length / perceived_width`.
///
/// Returns None for a degenerate quadrilateral.
pub fn estimate_distance(
    perceived_width_px: f32,
    marker_size_cm: f32,
    focal_length_px: f32,
) -> Option<f32> {
    if perceived_width_px > f32::EPSILON {
        Some(marker_size_cm * focal_length_px / perceived_width_px)
    } else {
        None
    }
}

/// Predefined marker dictionary: `DICT_<bits>X<bits>_<count>`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MarkerDictionary {
    /// Grid side in bits (4..=7)
    pub bits: u8,
    /// Number of markers (50, 100, 250 or 1000)
    pub count: u16,
}

impl MarkerDictionary {
    pub const SUPPORTED_BITS: [u8; 4] = [4, 5, 6, 7];
    pub const SUPPORTED_COUNTS: [u16; 4] = [50, 100, 250, 1000];
}

impl Default for MarkerDictionary {
    fn default() -> Self {
        Self { bits: 6, count: 250 }
    }
}

impl FromStr for MarkerDictionary {
    type Err = LakshyaError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LakshyaError::Config(format!("Unknown marker dictionary '{}'", s));

        let rest = s.strip_prefix("DICT_").ok_or_else(invalid)?;
        let (grid, count) = rest.split_once('_').ok_or_else(invalid)?;
        let (w, h) = grid.split_once('X').ok_or_else(invalid)?;
        if w != h {
            return Err(invalid());
        }
        let bits: u8 = w.parse().map_err(|_| invalid())?;
        let count: u16 = count.parse().map_err(|_| invalid())?;

        if !Self::SUPPORTED_BITS.contains(&bits) || !Self::SUPPORTED_COUNTS.contains(&count) {
            return Err(invalid());
        }
        Ok(Self { bits, count })
    }
}

impl fmt::Display for MarkerDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DICT_{0}X{0}_{1}", self.bits, self.count)
    }
}

/// External marker recognition capability
pub trait MarkerRecognizer: Send {
    /// All markers visible in the frame, in the recognizer's own order
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<MarkerDetection>>;

    fn name(&self) -> &str;
}

/// Recognizer that never sees a marker.
///
/// Used when no vision backend is compiled in; marker mode then always
/// reports "not found" and the car stays stopped.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRecognizer;

impl MarkerRecognizer for NullRecognizer {
    fn recognize(&mut self, _frame: &Frame) -> Result<Vec<MarkerDetection>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Marker detector with pinhole distance estimation
pub struct MarkerDetector {
    recognizer: Box<dyn MarkerRecognizer>,
    marker_size_cm: f32,
    focal_length_px: f32,
}

impl MarkerDetector {
    pub fn new(
        recognizer: Box<dyn MarkerRecognizer>,
        marker_size_cm: f32,
        focal_length_px: f32,
    ) -> Self {
        Self {
            recognizer,
            marker_size_cm,
            focal_length_px,
        }
    }

    pub fn from_config(recognizer: Box<dyn MarkerRecognizer>, config: &ArucoConfig) -> Self {
        Self::new(recognizer, config.marker_size_cm, config.focal_length_px)
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }
}

impl TargetDetector for MarkerDetector {
    fn detect(&mut self, frame: &Frame) -> TargetObservation {
        let detections = match self.recognizer.recognize(frame) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Marker recognition failed: {}", e);
                return TargetObservation::not_found();
            }
        };

        // First in recognizer order wins
        let Some(marker) = detections.first() else {
            return TargetObservation::not_found();
        };
        if detections.len() > 1 {
            tracing::trace!(
                count = detections.len(),
                chosen = marker.id,
                "Several markers visible"
            );
        }

        let width = marker.perceived_width();
        let Some(distance) = estimate_distance(width, self.marker_size_cm, self.focal_length_px)
        else {
            tracing::debug!(id = marker.id, "Degenerate marker quadrilateral ignored");
            return TargetObservation::not_found();
        };

        let [cx, cy] = marker.center();
        TargetObservation::found(cx, cy, distance)
            .with_info(INFO_MARKER_ID, marker.id as f32)
            .with_info(INFO_MARKER_WIDTH, width)
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Aruco
    }
}
