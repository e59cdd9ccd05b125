//! Target detection
//!
//! Two detectors share one capability, [`TargetDetector`]:
//! - [`MarkerDetector`]: fiducial marker via an external [`MarkerRecognizer`],
//!   distance from the pinhole model
//! - [`ColorDetector`]: largest HSV-thresholded blob, area as a distance proxy
//!
//! Neither fails on a missing target: they return
//! [`TargetObservation::not_found`].

pub mod color;
pub mod marker;
pub mod mask;
#[cfg(feature = "opencv")]
pub mod opencv_aruco;

pub use color::{ColorDetector, HsvRange};
pub use marker::{
    MarkerDetection, MarkerDetector, MarkerDictionary, MarkerRecognizer, NullRecognizer,
};
#[cfg(feature = "opencv")]
pub use opencv_aruco::OpenCvArucoRecognizer;

use crate::stream::Frame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Info key: recognised marker id
pub const INFO_MARKER_ID: &str = "marker_id";
/// Info key: perceived marker width in pixels
pub const INFO_MARKER_WIDTH: &str = "marker_width_px";
/// Info key: blob area in pixels
pub const INFO_AREA: &str = "area";
/// Info key: blob area / frame area
pub const INFO_AREA_RATIO: &str = "area_ratio";

/// Which detector drives autonomous mode
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Fiducial marker
    #[default]
    Aruco,
    /// Colour blob
    Color,
}

impl DetectorKind {
    /// The other detector
    pub fn toggled(self) -> Self {
        match self {
            DetectorKind::Aruco => DetectorKind::Color,
            DetectorKind::Color => DetectorKind::Aruco,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DetectorKind::Aruco => "ARUCO",
            DetectorKind::Color => "COLOR",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a detector saw in one frame.
///
/// Created fresh per frame. When `detected` is false every numeric field is NaN.
#[derive(Clone, Debug)]
pub struct TargetObservation {
    pub detected: bool,
    /// Target centre, pixels from the left edge
    pub center_x: f32,
    /// Target centre, pixels from the top edge
    pub center_y: f32,
    /// Distance in cm (marker) or blob area in pixels (colour)
    pub distance_metric: f32,
    /// Detector-specific extras, see the `INFO_*` keys
    pub info: HashMap<&'static str, f32>,
}

impl TargetObservation {
    pub fn found(center_x: f32, center_y: f32, distance_metric: f32) -> Self {
        Self {
            detected: true,
            center_x,
            center_y,
            distance_metric,
            info: HashMap::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            detected: false,
            center_x: f32::NAN,
            center_y: f32::NAN,
            distance_metric: f32::NAN,
            info: HashMap::new(),
        }
    }

    pub fn with_info(mut self, key: &'static str, value: f32) -> Self {
        self.info.insert(key, value);
        self
    }

    pub fn info(&self, key: &str) -> Option<f32> {
        self.info.get(key).copied()
    }
}

/// Locate a target in a frame
pub trait TargetDetector: Send {
    fn detect(&mut self, frame: &Frame) -> TargetObservation;

    fn kind(&self) -> DetectorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_has_nan_fields() {
        let obs = TargetObservation::not_found();
        assert!(!obs.detected);
        assert!(obs.center_x.is_nan());
        assert!(obs.center_y.is_nan());
        assert!(obs.distance_metric.is_nan());
    }

    #[test]
    fn test_detector_kind_toggle_and_serde() {
        assert_eq!(DetectorKind::Aruco.toggled(), DetectorKind::Color);
        assert_eq!(DetectorKind::Color.toggled(), DetectorKind::Aruco);

        #[derive(Deserialize)]
        struct Wrapper {
            kind: DetectorKind,
        }
        let w: Wrapper = toml::from_str("kind = \"color\"").unwrap();
        assert_eq!(w.kind, DetectorKind::Color);
    }
}
