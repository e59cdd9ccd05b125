//! Shared state between the control loop and the transmitter thread.
//!
//! The control loop is the only writer of the command; the transmitter reads
//! a snapshot every cycle. The three values are replaced together under one
//! short-lived lock so a reader never sees throttle from one update and
//! steering from another.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Normalized drive command, every field in [-1, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommandState {
    /// Forward positive, reverse negative
    pub throttle: f32,
    /// Right positive, left negative
    pub steering: f32,
    /// In-place rotation rate
    pub omega: f32,
}

impl CommandState {
    /// All-zero command (stop).
    pub const ZERO: CommandState = CommandState {
        throttle: 0.0,
        steering: 0.0,
        omega: 0.0,
    };

    /// Build a command with each component clamped to [-1, 1].
    pub fn new(throttle: f32, steering: f32, omega: f32) -> Self {
        Self {
            throttle: clamp_unit(throttle),
            steering: clamp_unit(steering),
            omega: clamp_unit(omega),
        }
    }

    /// Same command with every component clamped to [-1, 1].
    pub fn clamped(self) -> Self {
        Self::new(self.throttle, self.steering, self.omega)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Shared state between all threads.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Current command (written by the control loop, read by the transmitter)
    command: Mutex<CommandState>,

    /// Shutdown signal for graceful termination
    shutdown: AtomicBool,

    /// Completed transmitter cycles
    transmit_cycles: AtomicU64,

    /// Characteristic writes that failed
    write_failures: AtomicU64,

    /// Frames handled by the control loop
    frames_processed: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole command in one step.
    pub fn set_command(&self, command: CommandState) {
        *self.command.lock() = command.clamped();
    }

    /// Consistent snapshot of the current command.
    pub fn command(&self) -> CommandState {
        *self.command.lock()
    }

    /// Zero throttle, steering and omega.
    pub fn zero_command(&self) {
        self.set_command(CommandState::ZERO);
    }

    /// Signal shutdown.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Check if shutdown is signaled.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn increment_transmit_cycles(&self) {
        self.transmit_cycles.fetch_add(1, Ordering::AcqRel);
    }

    pub fn transmit_cycles(&self) -> u64 {
        self.transmit_cycles.load(Ordering::Acquire)
    }

    pub fn increment_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn increment_frames_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_command_is_clamped() {
        let cmd = CommandState::new(1.7, -3.0, f32::NAN);
        assert_eq!(cmd, CommandState::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn test_set_and_snapshot() {
        let shared = SharedState::new();
        assert!(shared.command().is_zero());

        shared.set_command(CommandState::new(0.3, -0.6, 0.1));
        assert_eq!(shared.command(), CommandState::new(0.3, -0.6, 0.1));

        shared.zero_command();
        assert!(shared.command().is_zero());
    }

    #[test]
    fn test_snapshots_are_never_mixed() {
        // Writer alternates between two commands; every snapshot must be one of them
        let shared = Arc::new(SharedState::new());
        let a = CommandState::new(0.3, 0.6, 0.0);
        let b = CommandState::new(-0.3, -0.6, 0.5);

        let writer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 0..10_000 {
                    shared.set_command(if i % 2 == 0 { a } else { b });
                }
            })
        };

        for _ in 0..10_000 {
            let snap = shared.command();
            assert!(snap == a || snap == b || snap.is_zero(), "torn read: {:?}", snap);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_shutdown_flag() {
        let shared = SharedState::new();
        assert!(!shared.should_shutdown());
        shared.signal_shutdown();
        assert!(shared.should_shutdown());
    }
}
