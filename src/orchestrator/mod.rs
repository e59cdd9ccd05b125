//! Control loop orchestrator
//!
//! Owns the frame source, both detectors, the operator mode and the
//! transmitter thread. Each frame flows one way:
//!
//! ```text
//! MjpegStream -> TargetDetector -> control::compute -> SharedState -> transmitter -> sink
//! ```
//!
//! The vision path never touches the sink; it only replaces the shared
//! command. Shutdown always runs the same sequence: zero the command, wait for
//! the transmitter to flush it, stop the transmitter, release the stream,
//! disconnect the sink.

mod mode;
mod status;

pub use mode::{ControlMode, ManualState, OperatorEvent};
pub use status::{DetectionSummary, StatusReport};

use crate::config::LakshyaConfig;
use crate::control::{self, ThrottlePolicy};
use crate::error::{LakshyaError, Result};
use crate::shared::{CommandState, SharedState};
use crate::stream::{Frame, FramePoll, MjpegStream};
use crate::transmit::{CommandSink, TransmitterConfig, TransmitterHandle, Waypoint};
use crate::vision::{ColorDetector, DetectorKind, MarkerDetector, TargetDetector};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest single wait for a frame, so operator events stay responsive
const FRAME_POLL_SLICE: Duration = Duration::from_millis(100);

/// Why a session ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    OperatorQuit,
    EndOfStream,
}

/// Result of one [`Orchestrator::step`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    /// A frame was processed and this command written
    Frame {
        command: CommandState,
        detection: DetectionSummary,
    },
    /// No frame yet
    Waiting,
    Finished(SessionEnd),
}

/// Counters reported when the session ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub frames_with_detection: u64,
    pub reconnects: u32,
    pub decode_failures: u64,
    /// Multipart sections that held no complete JPEG
    pub dropped_sections: u64,
    pub write_failures: u64,
}

/// The control loop
pub struct Orchestrator {
    config: LakshyaConfig,
    shared: Arc<SharedState>,
    stream: MjpegStream,
    marker: MarkerDetector,
    color: ColorDetector,
    active: DetectorKind,
    mode: ControlMode,
    manual: ManualState,
    events: Receiver<OperatorEvent>,
    transmitter: Option<TransmitterHandle>,
    recalibrate_pending: bool,
    last_frame_at: Instant,
    last_status: Option<StatusReport>,
    stats: SessionStats,
    shut_down: bool,
}

impl Orchestrator {
    /// Build the orchestrator and start the transmitter thread on `sink`.
    pub fn new(
        config: LakshyaConfig,
        shared: Arc<SharedState>,
        stream: MjpegStream,
        marker: MarkerDetector,
        color: ColorDetector,
        sink: Box<dyn CommandSink>,
        events: Receiver<OperatorEvent>,
    ) -> Result<Self> {
        shared.zero_command();
        let transmitter = TransmitterHandle::spawn(
            sink,
            Arc::clone(&shared),
            TransmitterConfig::from_config(&config.ble),
        )?;

        let active = config.navigation.detector;
        tracing::info!(
            "Control loop ready: detector {}, marker backend '{}'",
            active,
            marker.recognizer_name()
        );

        Ok(Self {
            config,
            shared,
            stream,
            marker,
            color,
            active,
            mode: ControlMode::default(),
            manual: ManualState::default(),
            events,
            transmitter: Some(transmitter),
            recalibrate_pending: false,
            last_frame_at: Instant::now(),
            last_status: None,
            stats: SessionStats::default(),
            shut_down: false,
        })
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn active_detector(&self) -> DetectorKind {
        self.active
    }

    pub fn color_detector(&self) -> &ColorDetector {
        &self.color
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Queue a waypoint for the transmitter
    pub fn queue_waypoint(&self, waypoint: Waypoint) -> bool {
        self.transmitter
            .as_ref()
            .is_some_and(|t| t.queue_waypoint(waypoint))
    }

    /// Run until quit, end of stream, or an unrecoverable stream failure.
    ///
    /// The shutdown sequence runs on every path.
    pub fn run(mut self) -> Result<SessionStats> {
        let outcome = self.control_loop();
        self.shutdown();

        match outcome {
            Ok(end) => {
                tracing::info!("Session ended: {:?}", end);
                Ok(self.stats)
            }
            Err(e) => {
                tracing::error!("Session aborted: {}", e);
                Err(e)
            }
        }
    }

    fn control_loop(&mut self) -> Result<SessionEnd> {
        loop {
            if let Step::Finished(end) = self.step()? {
                return Ok(end);
            }
        }
    }

    /// Handle pending operator events, then wait briefly for one frame.
    pub fn step(&mut self) -> Result<Step> {
        if self.shared.should_shutdown() {
            return Ok(Step::Finished(SessionEnd::OperatorQuit));
        }

        while let Ok(event) = self.events.try_recv() {
            if self.handle_event(event) {
                return Ok(Step::Finished(SessionEnd::OperatorQuit));
            }
        }

        match self.stream.poll_frame(FRAME_POLL_SLICE) {
            FramePoll::Frame(frame) => {
                self.last_frame_at = Instant::now();
                Ok(self.process_frame(&frame))
            }
            FramePoll::Timeout => {
                self.handle_stall()?;
                Ok(Step::Waiting)
            }
            FramePoll::EndOfStream => {
                tracing::info!("Camera stream ended");
                self.shared.zero_command();
                Ok(Step::Finished(SessionEnd::EndOfStream))
            }
            FramePoll::TransportError(e) => {
                let err = LakshyaError::Transport(e);
                tracing::warn!("Camera stream error: {}", err);
                self.recover(&err.to_string())?;
                Ok(Step::Waiting)
            }
        }
    }

    /// Apply one operator event. Returns true on quit.
    pub fn handle_event(&mut self, event: OperatorEvent) -> bool {
        match event {
            OperatorEvent::Quit => {
                tracing::info!("Quit requested");
                return true;
            }
            OperatorEvent::ManualDelta {
                throttle,
                steering,
                omega,
            } if self.mode == ControlMode::Manual => {
                self.manual
                    .apply(throttle, steering, omega, &self.config.manual);
                self.shared.set_command(self.manual.command());
            }
            OperatorEvent::SwitchDetector => {
                self.active = self.active.toggled();
                tracing::info!("Switched detector to {}", self.active);
            }
            OperatorEvent::RecalibrateColor => {
                self.recalibrate_pending = true;
                tracing::info!("Colour range will be sampled from the next frame");
            }
            OperatorEvent::EmergencyStop => {
                tracing::warn!("Emergency stop");
                self.manual.reset();
                self.shared.zero_command();
            }
            _ => {}
        }

        let next = self.mode.transition(&event);
        if next != self.mode {
            tracing::info!("Mode {} -> {}", self.mode, next);
            match next {
                ControlMode::Manual => {
                    self.manual.reset();
                    self.shared.set_command(self.manual.command());
                }
                // Autonomous writes on the next frame; stop until then
                ControlMode::Autonomous | ControlMode::Paused => self.shared.zero_command(),
            }
            self.mode = next;
        }
        false
    }

    fn process_frame(&mut self, frame: &Frame) -> Step {
        self.stats.frames += 1;
        self.shared.increment_frames_processed();

        if self.recalibrate_pending {
            self.recalibrate_pending = false;
            if let Some(hsv) = self.color.recalibrate(frame) {
                tracing::info!("Sampled centre colour HSV {:?}", hsv);
            }
        }

        let (command, detection) = match self.mode {
            ControlMode::Autonomous => self.autonomous_command(frame),
            ControlMode::Manual => (self.manual.command(), DetectionSummary::Idle),
            ControlMode::Paused => (CommandState::ZERO, DetectionSummary::Idle),
        };

        self.shared.set_command(command);
        self.report_status(detection, command);

        Step::Frame { command, detection }
    }

    fn autonomous_command(&mut self, frame: &Frame) -> (CommandState, DetectionSummary) {
        let detector: &mut dyn TargetDetector = match self.active {
            DetectorKind::Aruco => &mut self.marker,
            DetectorKind::Color => &mut self.color,
        };
        let kind = detector.kind();
        let observation = detector.detect(frame);
        if observation.detected {
            self.stats.frames_with_detection += 1;
        }

        let nav = &self.config.navigation;
        let policy = ThrottlePolicy::for_detector(kind, &self.config);
        let drive = control::compute(&observation, frame.width(), frame.height(), nav, &policy)
            .with_reverse_steering(nav.invert_steering_on_reverse);

        (
            CommandState::new(drive.throttle, drive.steering, 0.0),
            DetectionSummary::from_observation(kind, &observation),
        )
    }

    fn handle_stall(&mut self) -> Result<()> {
        let stalled = self.last_frame_at.elapsed();

        if stalled >= self.config.camera.stale_frame()
            && self.mode == ControlMode::Autonomous
            && !self.shared.command().is_zero()
        {
            tracing::warn!("No frame for {:?}, stopping", stalled);
            self.shared.zero_command();
        }

        if stalled >= self.config.camera.read_timeout() {
            self.recover(&format!("no frame for {:?}", stalled))?;
        }
        Ok(())
    }

    /// Reopen the stream, up to `max_reconnect_attempts` times.
    fn recover(&mut self, reason: &str) -> Result<()> {
        self.shared.zero_command();
        let attempts = self.config.camera.max_reconnect_attempts;

        for attempt in 1..=attempts {
            if self.shared.should_shutdown() {
                return Ok(());
            }
            thread::sleep(self.config.camera.reconnect_delay());
            tracing::info!("Reconnecting to camera (attempt {}/{})", attempt, attempts);

            match self.stream.reconnect() {
                Ok(()) => {
                    self.stats.reconnects += 1;
                    self.last_frame_at = Instant::now();
                    return Ok(());
                }
                Err(e) => tracing::warn!("Reconnect failed: {}", e),
            }
        }

        Err(LakshyaError::StreamUnavailable(format!(
            "{} lost ({}), {} reconnect attempts failed",
            self.stream.describe(),
            reason,
            attempts
        )))
    }

    fn report_status(&mut self, detection: DetectionSummary, command: CommandState) {
        let report = StatusReport {
            mode: self.mode,
            detector: self.active,
            detection,
            command,
            frames: self.stats.frames,
        };

        if self
            .last_status
            .is_none_or(|last| report.differs_materially(&last))
        {
            tracing::info!("{}", report);
        } else {
            tracing::debug!("{}", report);
        }
        self.last_status = Some(report);
    }

    /// Stop the car and release everything, in order. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        tracing::info!("Stopping robot...");

        self.shared.zero_command();

        let sink = match self.transmitter.take() {
            Some(mut transmitter) => {
                if !transmitter.wait_for_flush(self.config.ble.flush_timeout()) {
                    tracing::warn!("Zero command flush not confirmed before timeout");
                }
                transmitter.stop()
            }
            None => None,
        };

        let extractor = self.stream.extractor_stats();
        self.stream.stop();

        if let Some(mut sink) = sink {
            sink.disconnect();
        }

        self.stats.decode_failures = self.stream.decode_failures();
        self.stats.dropped_sections = extractor.dropped_sections;
        self.stats.write_failures = self.shared.write_failures();
        tracing::info!(
            "Session: {} frames, {} with target, {} reconnects, {} bad frames, {} failed writes",
            self.stats.frames,
            self.stats.frames_with_detection,
            self.stats.reconnects,
            self.stats.decode_failures,
            self.stats.write_failures
        );
        tracing::info!(
            "Extractor: {} multipart frames, {} scanned frames, {} dropped sections, {} trims",
            extractor.multipart_frames,
            extractor.scanned_frames,
            extractor.dropped_sections,
            extractor.trims
        );
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
