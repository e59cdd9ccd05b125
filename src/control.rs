//! Steering/throttle controller
//!
//! Pure functions from a [`TargetObservation`] and the frame geometry to a
//! [`DriveCommand`]. No state, no I/O.
//!
//! Steering is proportional to the horizontal pixel error, with a dead zone,
//! a magnitude clamp and quantization to a fixed step. Throttle is bang-bang
//! around a target band: forward when the target is too far, reverse at a
//! reduced rate when too close, zero inside the band.

use crate::config::{LakshyaConfig, NavigationConfig};
use crate::vision::{DetectorKind, TargetObservation};

/// Tolerance used when comparing quantized values against the clamp
const QUANTIZE_EPS: f32 = 1e-6;

/// Throttle/steering pair in [-1, 1]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriveCommand {
    pub throttle: f32,
    pub steering: f32,
}

impl DriveCommand {
    pub const ZERO: DriveCommand = DriveCommand {
        throttle: 0.0,
        steering: 0.0,
    };

    pub fn is_reversing(&self) -> bool {
        self.throttle < 0.0
    }

    /// Mirror steering while reversing, when `invert` is set.
    ///
    /// Seen from a front camera, the target drifts the other way when the
    /// car backs up.
    pub fn with_reverse_steering(self, invert: bool) -> Self {
        if invert && self.is_reversing() {
            Self {
                steering: normalize_zero(-self.steering),
                ..self
            }
        } else {
            self
        }
    }
}

/// How the distance proxy maps to throttle
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ThrottlePolicy {
    /// `distance_metric` is a distance in cm
    Distance { target_cm: f32, tolerance_cm: f32 },
    /// `distance_metric` is a blob area in pixels, compared as a share of the frame
    AreaRatio {
        target_ratio: f32,
        tolerance: f32,
        /// Extra factor on reverse throttle
        reverse_scale: f32,
    },
}

impl ThrottlePolicy {
    /// Policy matching the active detector
    pub fn for_detector(kind: DetectorKind, config: &LakshyaConfig) -> Self {
        match kind {
            DetectorKind::Aruco => ThrottlePolicy::Distance {
                target_cm: config.navigation.target_distance_cm,
                tolerance_cm: config.navigation.distance_tolerance_cm,
            },
            DetectorKind::Color => ThrottlePolicy::AreaRatio {
                target_ratio: config.color_tracking.target_area_ratio,
                tolerance: config.color_tracking.area_ratio_tolerance,
                reverse_scale: config.color_tracking.reverse_scale,
            },
        }
    }
}

/// Compute the drive command for one observation.
///
/// Not detected always yields exactly (0, 0).
pub fn compute(
    observation: &TargetObservation,
    frame_width: u32,
    frame_height: u32,
    nav: &NavigationConfig,
    policy: &ThrottlePolicy,
) -> DriveCommand {
    if !observation.detected {
        return DriveCommand::ZERO;
    }

    DriveCommand {
        throttle: throttle(observation, frame_width, frame_height, nav, policy),
        steering: steering(observation.center_x, frame_width, nav),
    }
}

/// Steering for a target centred at `center_x`.
pub fn steering(center_x: f32, frame_width: u32, nav: &NavigationConfig) -> f32 {
    let error = center_x - frame_width as f32 / 2.0;
    let raw = error * nav.steering_kp;
    shape_steering(raw, nav)
}

/// Dead zone, clamp, quantize.
///
/// The result never exceeds `max_steering` in magnitude: when rounding to the
/// step would overshoot the clamp, the next step toward zero is used instead.
pub fn shape_steering(raw: f32, nav: &NavigationConfig) -> f32 {
    if !raw.is_finite() || raw.abs() < nav.steering_dead_zone {
        return 0.0;
    }

    let max = nav.max_steering;
    let clamped = raw.clamp(-max, max);
    if clamped == 0.0 {
        return 0.0;
    }

    let step = nav.steering_quantization;
    let mut q = quantize(clamped, step);
    if q.abs() > max + QUANTIZE_EPS {
        q = quantize(q - step.copysign(q), step);
    }
    normalize_zero(q)
}

/// Round to the nearest multiple of `step`
pub fn quantize(value: f32, step: f32) -> f32 {
    if step <= 0.0 {
        return value;
    }
    normalize_zero((value / step).round() * step)
}

fn throttle(
    observation: &TargetObservation,
    frame_width: u32,
    frame_height: u32,
    nav: &NavigationConfig,
    policy: &ThrottlePolicy,
) -> f32 {
    let forward = nav.base_throttle;
    let reverse = -nav.base_throttle * nav.backward_throttle_multiplier;

    match *policy {
        ThrottlePolicy::Distance {
            target_cm,
            tolerance_cm,
        } => {
            let error = observation.distance_metric - target_cm;
            if error.abs() <= tolerance_cm || error.is_nan() {
                0.0
            } else if error > 0.0 {
                forward
            } else {
                reverse
            }
        }
        ThrottlePolicy::AreaRatio {
            target_ratio,
            tolerance,
            reverse_scale,
        } => {
            let frame_area = frame_width as f32 * frame_height as f32;
            if frame_area <= 0.0 {
                return 0.0;
            }
            let ratio = observation.distance_metric / frame_area;
            // Positive when the blob is smaller than wanted (too far)
            let size_error = target_ratio - ratio;
            if size_error > tolerance {
                forward
            } else if size_error < -tolerance {
                reverse * reverse_scale
            } else {
                0.0
            }
        }
    }
}

fn normalize_zero(v: f32) -> f32 {
    if v == 0.0 { 0.0 } else { v }
}
