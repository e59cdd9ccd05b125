//! One-line operator status

use super::mode::ControlMode;
use crate::shared::CommandState;
use crate::transmit::encode_unit;
use crate::vision::{DetectorKind, INFO_AREA_RATIO, INFO_MARKER_ID, TargetObservation};
use std::fmt;

/// Detection part of the status line
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectionSummary {
    /// Vision did not run this frame (manual, paused, no frame)
    Idle,
    Lost,
    Marker { id: i32, distance_cm: f32 },
    Blob { area: f32, ratio: f32 },
}

impl DetectionSummary {
    pub fn from_observation(kind: DetectorKind, obs: &TargetObservation) -> Self {
        if !obs.detected {
            return DetectionSummary::Lost;
        }
        match kind {
            DetectorKind::Aruco => DetectionSummary::Marker {
                id: obs.info(INFO_MARKER_ID).map_or(-1, |v| v as i32),
                distance_cm: obs.distance_metric,
            },
            DetectorKind::Color => DetectionSummary::Blob {
                area: obs.distance_metric,
                ratio: obs.info(INFO_AREA_RATIO).unwrap_or(f32::NAN),
            },
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(
            self,
            DetectionSummary::Marker { .. } | DetectionSummary::Blob { .. }
        )
    }
}

/// Snapshot of the orchestrator for display
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusReport {
    pub mode: ControlMode,
    pub detector: DetectorKind,
    pub detection: DetectionSummary,
    pub command: CommandState,
    pub frames: u64,
}

impl StatusReport {
    /// True when this report differs from `other` in a way worth an info line:
    /// mode, detector, or whether (and which marker) is in view
    pub fn differs_materially(&self, other: &StatusReport) -> bool {
        let marker_id = |d: &DetectionSummary| match d {
            DetectionSummary::Marker { id, .. } => Some(*id),
            _ => None,
        };
        self.mode != other.mode
            || self.detector != other.detector
            || self.detection.is_detected() != other.detection.is_detected()
            || marker_id(&self.detection) != marker_id(&other.detection)
            || matches!(self.detection, DetectionSummary::Idle)
                != matches!(other.detection, DetectionSummary::Idle)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} | ", self.mode, self.detector)?;
        match self.detection {
            DetectionSummary::Idle => write!(f, "-")?,
            DetectionSummary::Lost => write!(f, "no target")?,
            DetectionSummary::Marker { id, distance_cm } => {
                write!(f, "id {} @ {:.1}cm", id, distance_cm)?
            }
            DetectionSummary::Blob { area, ratio } => {
                write!(f, "blob {:.0}px ({:.1}%)", area, ratio * 100.0)?
            }
        }
        let c = self.command;
        write!(
            f,
            " | T {:+.2} ({}) S {:+.2} ({})",
            c.throttle,
            encode_unit(c.throttle),
            c.steering,
            encode_unit(c.steering)
        )?;
        if c.omega != 0.0 {
            write!(f, " W {:+.2} ({})", c.omega, encode_unit(c.omega))?;
        }
        Ok(())
    }
}
