//! Control mode state machine and operator events

use crate::config::ManualConfig;
use crate::shared::CommandState;
use std::fmt;

/// Who drives the car
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ControlMode {
    /// Detector + controller write the command every frame
    #[default]
    Autonomous,
    /// Operator deltas write the command, vision is bypassed
    Manual,
    /// Command forced to zero every frame
    Paused,
}

impl ControlMode {
    /// The only place modes change.
    ///
    /// - pause toggles Autonomous and Paused; ignored in Manual
    /// - manual toggles into Manual from anywhere, and out of it to Paused
    /// - emergency stop always lands in Paused
    pub fn transition(self, event: &OperatorEvent) -> ControlMode {
        use ControlMode::*;
        match (self, event) {
            (Autonomous, OperatorEvent::TogglePause) => Paused,
            (Paused, OperatorEvent::TogglePause) => Autonomous,
            (Manual, OperatorEvent::TogglePause) => Manual,
            (Manual, OperatorEvent::ToggleManual) => Paused,
            (_, OperatorEvent::ToggleManual) => Manual,
            (_, OperatorEvent::EmergencyStop) => Paused,
            (mode, _) => mode,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlMode::Autonomous => "AUTO",
            ControlMode::Manual => "MANUAL",
            ControlMode::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Discrete operator input
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperatorEvent {
    Quit,
    TogglePause,
    ToggleManual,
    /// Incremental change in steps of the configured size (-1, 0 or +1 each)
    ManualDelta { throttle: i8, steering: i8, omega: i8 },
    /// Zero all channels and pause
    EmergencyStop,
    /// Swap marker and colour detection
    SwitchDetector,
    /// Re-centre the colour range on the middle of the next frame
    RecalibrateColor,
}

impl OperatorEvent {
    pub fn throttle(dir: i8) -> Self {
        OperatorEvent::ManualDelta {
            throttle: dir,
            steering: 0,
            omega: 0,
        }
    }

    pub fn steering(dir: i8) -> Self {
        OperatorEvent::ManualDelta {
            throttle: 0,
            steering: dir,
            omega: 0,
        }
    }

    pub fn omega(dir: i8) -> Self {
        OperatorEvent::ManualDelta {
            throttle: 0,
            steering: 0,
            omega: dir,
        }
    }
}

/// Operator-held command in manual mode
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ManualState {
    command: CommandState,
}

impl ManualState {
    pub fn command(&self) -> CommandState {
        self.command
    }

    /// Apply one delta; each channel stays within [-1, 1].
    pub fn apply(&mut self, throttle: i8, steering: i8, omega: i8, steps: &ManualConfig) {
        let c = self.command;
        self.command = CommandState::new(
            snap(c.throttle + f32::from(throttle) * steps.throttle_step),
            snap(c.steering + f32::from(steering) * steps.steering_step),
            snap(c.omega + f32::from(omega) * steps.omega_step),
        );
    }

    pub fn reset(&mut self) {
        self.command = CommandState::ZERO;
    }
}

// Repeated 0.1 steps drift in f32; keep values on a 1e-3 grid so ten
// presses land exactly on 1.0 and back on 0.0
fn snap(v: f32) -> f32 {
    let r = (v * 1000.0).round() / 1000.0;
    if r == 0.0 { 0.0 } else { r }
}
