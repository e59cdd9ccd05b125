//! Command transmitter thread
//!
//! Runs on its own fixed cadence, independent of frame arrival. Every cycle it
//! snapshots the shared [`CommandState`](crate::shared::CommandState), encodes
//! each channel to one byte and writes only the channels whose byte changed
//! since the last successful write (send-on-change). A failed write is logged,
//! the thread backs off, and the channel is retried on a later cycle because
//! its cache entry was never updated.

use super::encoding::{Waypoint, encode_unit};
use super::sink::CommandSink;
use crate::config::BleConfig;
use crate::error::Result;
use crate::shared::SharedState;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Characteristic identifiers for the four logical channels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channels {
    pub throttle: Uuid,
    pub steering: Uuid,
    pub omega: Uuid,
    pub waypoint: Uuid,
}

impl Channels {
    pub fn from_config(config: &BleConfig) -> Self {
        Self {
            throttle: config.char_throttle_uuid,
            steering: config.char_steering_uuid,
            omega: config.char_omega_uuid,
            waypoint: config.char_waypoint_uuid,
        }
    }
}

/// Transmitter tunables
#[derive(Clone, Copy, Debug)]
pub struct TransmitterConfig {
    pub channels: Channels,
    /// Cycle period
    pub interval: Duration,
    /// Extra sleep after a failed write
    pub retry_backoff: Duration,
}

impl TransmitterConfig {
    pub fn from_config(config: &BleConfig) -> Self {
        Self {
            channels: Channels::from_config(config),
            interval: config.send_interval(),
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// What one cycle did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Successful writes
    pub writes: usize,
    /// A write failed and the rest of the cycle was skipped
    pub failed: bool,
    /// Cancellation was observed mid-cycle
    pub cancelled: bool,
    /// The sink reported no link, so nothing was attempted
    pub disconnected: bool,
}

/// Send-on-change transmitter state.
///
/// [`Transmitter::cycle`] is synchronous so it can be driven directly in
/// tests; [`TransmitterHandle::spawn`] runs it on a dedicated thread.
pub struct Transmitter {
    sink: Box<dyn CommandSink>,
    shared: Arc<SharedState>,
    channels: Channels,
    /// Last byte successfully written per channel: throttle, steering, omega
    last_sent: [Option<u8>; 3],
    waypoints: Receiver<Waypoint>,
    pending_waypoint: Option<Waypoint>,
    cancel: Arc<AtomicBool>,
    link_down: bool,
}

impl Transmitter {
    pub fn new(
        sink: Box<dyn CommandSink>,
        shared: Arc<SharedState>,
        channels: Channels,
        waypoints: Receiver<Waypoint>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sink,
            shared,
            channels,
            last_sent: [None; 3],
            waypoints,
            pending_waypoint: None,
            cancel,
            link_down: false,
        }
    }

    /// Bytes last written per channel (throttle, steering, omega)
    pub fn last_sent(&self) -> [Option<u8>; 3] {
        self.last_sent
    }

    /// Snapshot the command and write whatever changed.
    pub fn cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        if !self.sink.is_connected() {
            if !self.link_down {
                tracing::warn!("Link down, holding commands until it returns");
                self.link_down = true;
            }
            report.disconnected = true;
            return report;
        }
        if self.link_down {
            tracing::info!("Link restored");
            self.link_down = false;
        }

        let cmd = self.shared.command();
        let encoded = [
            encode_unit(cmd.throttle),
            encode_unit(cmd.steering),
            encode_unit(cmd.omega),
        ];
        let uuids = [
            self.channels.throttle,
            self.channels.steering,
            self.channels.omega,
        ];

        for i in 0..3 {
            if self.last_sent[i] == Some(encoded[i]) {
                continue;
            }
            if self.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            match self.sink.write_characteristic(&uuids[i], &[encoded[i]]) {
                Ok(()) => {
                    self.last_sent[i] = Some(encoded[i]);
                    report.writes += 1;
                }
                Err(e) => {
                    self.record_failure(&e);
                    report.failed = true;
                    return report;
                }
            }
        }

        if self.pending_waypoint.is_none() {
            match self.waypoints.try_recv() {
                Ok(wp) => self.pending_waypoint = Some(wp),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        if let Some(wp) = self.pending_waypoint {
            if self.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            // Waypoints bypass send-on-change
            match self
                .sink
                .write_characteristic(&self.channels.waypoint, &wp.encode())
            {
                Ok(()) => {
                    tracing::info!(
                        "Waypoint sent: x={:.1}cm y={:.1}cm rot={:.1}deg",
                        wp.x,
                        wp.y,
                        wp.rotation
                    );
                    self.pending_waypoint = None;
                    report.writes += 1;
                }
                Err(e) => {
                    self.record_failure(&e);
                    report.failed = true;
                }
            }
        }

        report
    }

    /// Run cycles at `config.interval` until cancelled; hands the sink back.
    pub fn run(mut self, config: TransmitterConfig, stop: Receiver<()>) -> Box<dyn CommandSink> {
        tracing::info!(
            "Transmitter started ({}ms interval)",
            config.interval.as_millis()
        );

        while !self.is_cancelled() {
            let started = Instant::now();
            let report = self.cycle();
            self.shared.increment_transmit_cycles();
            if report.writes > 0 {
                tracing::trace!(writes = report.writes, "Transmit cycle");
            }

            let mut wait = config.interval.saturating_sub(started.elapsed());
            if report.failed || report.disconnected {
                wait += config.retry_backoff;
            }
            // Sleep until the next tick, waking early when the handle drops the sender
            match stop.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Transmitter stopped");
        self.sink
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn record_failure(&self, e: &crate::error::LakshyaError) {
        self.shared.increment_write_failures();
        tracing::warn!("Command write failed, backing off: {}", e);
    }
}

/// Owner's side of a running transmitter thread
pub struct TransmitterHandle {
    shared: Arc<SharedState>,
    cancel: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    waypoint_tx: Sender<Waypoint>,
    join: Option<JoinHandle<Box<dyn CommandSink>>>,
}

impl TransmitterHandle {
    /// Start the transmitter thread.
    pub fn spawn(
        sink: Box<dyn CommandSink>,
        shared: Arc<SharedState>,
        config: TransmitterConfig,
    ) -> Result<Self> {
        let (waypoint_tx, waypoint_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));

        let transmitter = Transmitter::new(
            sink,
            Arc::clone(&shared),
            config.channels,
            waypoint_rx,
            Arc::clone(&cancel),
        );

        let join = thread::Builder::new()
            .name("transmitter".into())
            .spawn(move || transmitter.run(config, stop_rx))?;

        Ok(Self {
            shared,
            cancel,
            stop_tx: Some(stop_tx),
            waypoint_tx,
            join: Some(join),
        })
    }

    /// Queue a waypoint; it is written on the next cycle regardless of history.
    pub fn queue_waypoint(&self, waypoint: Waypoint) -> bool {
        self.waypoint_tx.send(waypoint).is_ok()
    }

    /// Block until at least one full cycle has started and finished after
    /// this call, or `timeout` elapses. Returns false on timeout.
    pub fn wait_for_flush(&self, timeout: Duration) -> bool {
        let target = self.shared.transmit_cycles() + 2;
        let deadline = Instant::now() + timeout;
        while self.shared.transmit_cycles() < target {
            if Instant::now() >= deadline || self.is_finished() {
                return self.shared.transmit_cycles() >= target;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Cancel and join the thread, returning the sink.
    ///
    /// An in-flight write completes; no new write starts after this call.
    pub fn stop(&mut self) -> Option<Box<dyn CommandSink>> {
        self.cancel.store(true, Ordering::Release);
        self.stop_tx = None;
        let join = self.join.take()?;
        match join.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                tracing::error!("Transmitter thread panicked");
                None
            }
        }
    }
}

impl Drop for TransmitterHandle {
    fn drop(&mut self) {
        if let Some(mut sink) = self.stop() {
            sink.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::CommandState;
    use crate::transmit::sink::RecordingSink;

    fn channels() -> Channels {
        Channels::from_config(&BleConfig::default())
    }

    fn transmitter(sink: &RecordingSink) -> (Transmitter, Arc<SharedState>, Sender<Waypoint>) {
        let shared = Arc::new(SharedState::new());
        let (tx, rx) = unbounded();
        let t = Transmitter::new(
            Box::new(sink.clone()),
            Arc::clone(&shared),
            channels(),
            rx,
            Arc::new(AtomicBool::new(false)),
        );
        (t, shared, tx)
    }

    #[test]
    fn test_first_cycle_sends_every_channel() {
        let sink = RecordingSink::new();
        let (mut t, _shared, _wp) = transmitter(&sink);

        let report = t.cycle();
        assert_eq!(report.writes, 3);
        let ch = channels();
        assert_eq!(sink.last_payload(&ch.throttle), Some(vec![128]));
        assert_eq!(sink.last_payload(&ch.steering), Some(vec![128]));
        assert_eq!(sink.last_payload(&ch.omega), Some(vec![128]));
    }

    #[test]
    fn test_unchanged_values_are_not_resent() {
        let sink = RecordingSink::new();
        let (mut t, shared, _wp) = transmitter(&sink);

        t.cycle();
        assert_eq!(t.cycle().writes, 0);
        assert_eq!(t.cycle().writes, 0);

        shared.set_command(CommandState::new(0.3, 0.0, 0.0));
        let report = t.cycle();
        assert_eq!(report.writes, 1);
        assert_eq!(sink.last_payload(&channels().throttle), Some(vec![166]));
        assert_eq!(t.last_sent(), [Some(166), Some(128), Some(128)]);
    }

    #[test]
    fn test_failed_write_is_retried() {
        let sink = RecordingSink::new();
        let (mut t, shared, _wp) = transmitter(&sink);
        t.cycle();

        shared.set_command(CommandState::new(0.0, -0.6, 0.0));
        sink.fail_next(1);
        let report = t.cycle();
        assert!(report.failed);
        assert_eq!(report.writes, 0);
        assert_eq!(shared.write_failures(), 1);

        let report = t.cycle();
        assert_eq!(report.writes, 1);
        assert_eq!(sink.last_payload(&channels().steering), Some(vec![51]));
    }

    #[test]
    fn test_disconnected_sink_is_not_written() {
        let sink = RecordingSink::new();
        let (mut t, shared, wp) = transmitter(&sink);
        t.cycle();

        sink.clone().disconnect();
        shared.set_command(CommandState::new(0.3, 0.0, 0.0));
        wp.send(Waypoint::new(1.0, 2.0, 3.0)).unwrap();
        let report = t.cycle();
        assert!(report.disconnected);
        assert!(!report.failed);
        assert_eq!(report.writes, 0);
        assert_eq!(shared.write_failures(), 0);
        assert_eq!(sink.failed_writes(), 0);
        assert_eq!(t.last_sent(), [Some(128), Some(128), Some(128)]);

        // Changes held while the link was down go out once it returns
        sink.reconnect();
        let report = t.cycle();
        assert!(!report.disconnected);
        assert_eq!(report.writes, 2);
        assert_eq!(sink.last_payload(&channels().throttle), Some(vec![166]));
        assert_eq!(sink.payloads_for(&channels().waypoint).len(), 1);
    }

    #[test]
    fn test_waypoint_always_written() {
        let sink = RecordingSink::new();
        let (mut t, _shared, wp) = transmitter(&sink);
        t.cycle();

        let point = Waypoint::new(10.0, 20.0, 45.0);
        wp.send(point).unwrap();
        wp.send(point).unwrap();
        assert_eq!(t.cycle().writes, 1);
        assert_eq!(t.cycle().writes, 1);
        assert_eq!(t.cycle().writes, 0);
        assert_eq!(sink.payloads_for(&channels().waypoint).len(), 2);
    }

    #[test]
    fn test_cancelled_cycle_writes_nothing() {
        let sink = RecordingSink::new();
        let shared = Arc::new(SharedState::new());
        let (_tx, rx) = unbounded();
        let mut t = Transmitter::new(
            Box::new(sink.clone()),
            shared,
            channels(),
            rx,
            Arc::new(AtomicBool::new(true)),
        );
        let report = t.cycle();
        assert!(report.cancelled);
        assert!(sink.writes().is_empty());
    }

    #[test]
    fn test_thread_flushes_and_returns_sink() {
        let sink = RecordingSink::new();
        let shared = Arc::new(SharedState::new());
        let mut config = TransmitterConfig::from_config(&BleConfig::default());
        config.interval = Duration::from_millis(5);

        let mut handle =
            TransmitterHandle::spawn(Box::new(sink.clone()), Arc::clone(&shared), config).unwrap();

        shared.set_command(CommandState::new(1.0, -1.0, 0.0));
        assert!(handle.wait_for_flush(Duration::from_secs(2)));
        assert_eq!(sink.last_payload(&config.channels.throttle), Some(vec![255]));
        assert_eq!(sink.last_payload(&config.channels.steering), Some(vec![0]));

        let returned = handle.stop();
        assert!(returned.is_some());
        assert!(handle.is_finished());

        let count = sink.writes().len();
        shared.set_command(CommandState::new(0.5, 0.5, 0.5));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.writes().len(), count);
    }
}
