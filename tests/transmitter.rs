//! Transmitter thread behaviour against a recording sink.

use lakshya::config::BleConfig;
use lakshya::shared::{CommandState, SharedState};
use lakshya::transmit::{RecordingSink, TransmitterConfig, TransmitterHandle};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FLUSH: Duration = Duration::from_secs(1);

fn fast_config() -> TransmitterConfig {
    let mut ble = BleConfig::default();
    ble.send_interval_ms = 5;
    ble.retry_backoff_ms = 10;
    TransmitterConfig::from_config(&ble)
}

fn spawn(sink: &RecordingSink, shared: &Arc<SharedState>) -> TransmitterHandle {
    TransmitterHandle::spawn(Box::new(sink.clone()), Arc::clone(shared), fast_config())
        .expect("transmitter thread")
}

#[test]
fn test_only_changes_are_sent() {
    let sink = RecordingSink::new();
    let shared = Arc::new(SharedState::new());
    let config = fast_config();
    let mut tx = spawn(&sink, &shared);

    assert!(tx.wait_for_flush(FLUSH));
    shared.set_command(CommandState::new(0.3, 0.0, 0.0));
    assert!(tx.wait_for_flush(FLUSH));
    shared.set_command(CommandState::new(0.3, 0.0, 0.0));
    assert!(tx.wait_for_flush(FLUSH));
    shared.set_command(CommandState::new(-0.3, 0.0, 0.0));
    assert!(tx.wait_for_flush(FLUSH));

    assert!(tx.stop().is_some());

    let channels = config.channels;
    assert_eq!(
        sink.payloads_for(&channels.throttle),
        vec![vec![128], vec![166], vec![89]]
    );
    assert_eq!(sink.payloads_for(&channels.steering), vec![vec![128]]);
    assert_eq!(sink.payloads_for(&channels.omega), vec![vec![128]]);
}

#[test]
fn test_idle_cycles_write_nothing() {
    let sink = RecordingSink::new();
    let shared = Arc::new(SharedState::new());
    let mut tx = spawn(&sink, &shared);

    assert!(tx.wait_for_flush(FLUSH));
    let cycles = shared.transmit_cycles();
    thread::sleep(Duration::from_millis(50));
    tx.stop();

    assert!(shared.transmit_cycles() > cycles);
    assert_eq!(sink.writes().len(), 3);
}

#[test]
fn test_failed_write_retried_after_backoff() {
    let sink = RecordingSink::new();
    sink.fail_next(1);
    let shared = Arc::new(SharedState::new());
    shared.set_command(CommandState::new(0.0, 0.5, 0.0));
    let config = fast_config();
    let mut tx = spawn(&sink, &shared);

    // Failed cycle plus two clean ones
    assert!(tx.wait_for_flush(FLUSH));
    assert!(tx.wait_for_flush(FLUSH));
    tx.stop();

    assert_eq!(sink.failed_writes(), 1);
    assert_eq!(shared.write_failures(), 1);
    assert_eq!(sink.payloads_for(&config.channels.throttle), vec![vec![128]]);
    assert_eq!(sink.payloads_for(&config.channels.steering), vec![vec![191]]);
}

#[test]
fn test_stop_is_idempotent() {
    let sink = RecordingSink::new();
    let shared = Arc::new(SharedState::new());
    let mut tx = spawn(&sink, &shared);

    assert!(tx.stop().is_some());
    assert!(tx.stop().is_none());
    assert!(tx.is_finished());
    // The handle hands the sink back rather than disconnecting it
    assert_eq!(sink.disconnect_count(), 0);
}

#[test]
fn test_drop_disconnects() {
    let sink = RecordingSink::new();
    let shared = Arc::new(SharedState::new());
    let tx = spawn(&sink, &shared);
    drop(tx);
    assert_eq!(sink.disconnect_count(), 1);
}
