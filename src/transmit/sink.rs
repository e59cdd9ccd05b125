//! Wireless command sinks

use crate::error::{LakshyaError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Destination for characteristic writes
pub trait CommandSink: Send {
    /// Write `payload` to the characteristic `uuid`
    fn write_characteristic(&mut self, uuid: &Uuid, payload: &[u8]) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Release the link. Idempotent.
    fn disconnect(&mut self);
}

/// Sink used when no radio is attached: every write is logged and succeeds
pub struct SimulatedSink {
    device_name: String,
    connected: bool,
    writes: u64,
}

impl SimulatedSink {
    pub fn new(device_name: impl Into<String>) -> Self {
        let device_name = device_name.into();
        tracing::warn!(
            "No wireless backend, simulating writes to '{}'",
            device_name
        );
        Self {
            device_name,
            connected: true,
            writes: 0,
        }
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl CommandSink for SimulatedSink {
    fn write_characteristic(&mut self, uuid: &Uuid, payload: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(LakshyaError::SinkWrite(format!(
                "{} is disconnected",
                self.device_name
            )));
        }
        self.writes += 1;
        tracing::debug!(uuid = %uuid, payload = ?payload, "[sim] write");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        if self.connected {
            tracing::info!(
                "[sim] Disconnected from '{}' after {} writes",
                self.device_name,
                self.writes
            );
        }
        self.connected = false;
    }
}

/// One captured write
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedWrite {
    pub uuid: Uuid,
    pub payload: Vec<u8>,
    pub at: Instant,
}

/// In-memory sink for tests and dry runs.
///
/// Clones share the same log, so a test keeps one clone while the
/// transmitter owns another.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<RecordingSinkInner>>,
}

#[derive(Default)]
struct RecordingSinkInner {
    writes: Vec<RecordedWrite>,
    fail_next: usize,
    failed: u64,
    disconnected: bool,
    disconnects: u32,
    disconnected_at: Option<Instant>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().fail_next = n;
    }

    /// All successful writes, oldest first
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.lock().writes.clone()
    }

    /// Payloads written to one characteristic, oldest first
    pub fn payloads_for(&self, uuid: &Uuid) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|w| w.uuid == *uuid)
            .map(|w| w.payload.clone())
            .collect()
    }

    /// Last payload written to one characteristic
    pub fn last_payload(&self, uuid: &Uuid) -> Option<Vec<u8>> {
        self.payloads_for(uuid).pop()
    }

    pub fn failed_writes(&self) -> u64 {
        self.inner.lock().failed
    }

    pub fn disconnect_count(&self) -> u32 {
        self.inner.lock().disconnects
    }

    /// Bring the link back after `disconnect()`
    pub fn reconnect(&self) {
        self.inner.lock().disconnected = false;
    }

    /// When the first `disconnect()` happened
    pub fn disconnected_at(&self) -> Option<Instant> {
        self.inner.lock().disconnected_at
    }

    pub fn clear(&self) {
        self.inner.lock().writes.clear();
    }
}

impl CommandSink for RecordingSink {
    fn write_characteristic(&mut self, uuid: &Uuid, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.disconnected {
            return Err(LakshyaError::SinkWrite("recording sink disconnected".into()));
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            inner.failed += 1;
            return Err(LakshyaError::SinkWrite(format!("scripted failure on {}", uuid)));
        }
        inner.writes.push(RecordedWrite {
            uuid: *uuid,
            payload: payload.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.lock().disconnected
    }

    fn disconnect(&mut self) {
        let mut inner = self.inner.lock();
        if !inner.disconnected {
            inner.disconnected = true;
            inner.disconnects += 1;
            inner.disconnected_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_shares_log() {
        let probe = RecordingSink::new();
        let mut sink = probe.clone();
        let id = Uuid::from_u128(2);

        sink.write_characteristic(&id, &[128]).unwrap();
        sink.write_characteristic(&Uuid::from_u128(3), &[5]).unwrap();
        assert_eq!(probe.payloads_for(&id), vec![vec![128]]);
        assert_eq!(probe.writes().len(), 2);
    }

    #[test]
    fn test_scripted_failures_then_recovery() {
        let mut sink = RecordingSink::new();
        sink.fail_next(2);
        let id = Uuid::from_u128(2);

        assert!(sink.write_characteristic(&id, &[1]).is_err());
        assert!(sink.write_characteristic(&id, &[1]).is_err());
        assert!(sink.write_characteristic(&id, &[1]).is_ok());
        assert_eq!(sink.failed_writes(), 2);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut sink = RecordingSink::new();
        assert!(sink.disconnected_at().is_none());
        sink.disconnect();
        let first = sink.disconnected_at();
        sink.disconnect();
        assert!(first.is_some());
        assert_eq!(sink.disconnected_at(), first);
        assert!(!sink.is_connected());
        assert_eq!(sink.disconnect_count(), 1);
        assert!(sink.write_characteristic(&Uuid::nil(), &[0]).is_err());
    }

    #[test]
    fn test_simulated_sink_counts_writes() {
        let mut sink = SimulatedSink::new("BLE_Sensor_Hub");
        sink.write_characteristic(&Uuid::nil(), &[128]).unwrap();
        assert_eq!(sink.writes(), 1);
        sink.disconnect();
        assert!(sink.write_characteristic(&Uuid::nil(), &[128]).is_err());
    }
}
