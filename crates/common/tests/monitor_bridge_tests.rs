//! Monitor Bridge Integration Tests
//!
//! Tests for the channel bridge between the USB monitor thread and the
//! consumer that dispatches device events to the lifecycle controller.
//!
//! # Test Scenarios
//! - Command flow into the monitor thread
//! - Event flow out of the monitor thread, in order
//! - Lifecycle when either side is dropped
//! - Non-blocking behaviour when the event queue is full
//!
//! Run with: `cargo test -p common --test monitor_bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, oak_identity, with_timeout};
use common::{DeviceEvent, MonitorCommand, MonitorWorker, create_monitor_bridge};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Poll for the next command the way the USB thread does between libusb
/// event rounds. `None` once every bridge handle is gone.
fn next_command(worker: &MonitorWorker) -> Option<MonitorCommand> {
    loop {
        if let Some(cmd) = worker.try_recv_command() {
            return Some(cmd);
        }
        if worker.is_orphaned() {
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

// ============================================================================
// MonitorCommand Flow Tests
// ============================================================================

#[tokio::test]
async fn test_list_devices_command_flow() {
    let (bridge, worker) = create_monitor_bridge();

    let handle = thread::spawn(move || {
        if let Some(MonitorCommand::ListDevices { response }) = next_command(&worker) {
            let _ = response.send(vec![oak_identity("A1", 0x0104)]);
        }
    });

    let (tx, rx) = oneshot::channel();
    bridge
        .send_command(MonitorCommand::ListDevices { response: tx })
        .await
        .expect("Failed to send command");

    let devices = with_timeout(DEFAULT_TEST_TIMEOUT, rx)
        .await
        .expect("Timed out")
        .expect("Failed to receive response");
    assert_eq!(devices, vec![oak_identity("A1", 0x0104)]);

    handle.join().expect("Worker thread panicked");
}

#[test]
fn test_shutdown_command_flow_blocking() {
    let (bridge, worker) = create_monitor_bridge();
    let shutdown_received = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown_received.clone();

    let handle = thread::spawn(move || {
        loop {
            match next_command(&worker) {
                Some(MonitorCommand::Shutdown) => {
                    shutdown_flag.store(true, Ordering::Release);
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
    });

    bridge
        .send_command_blocking(MonitorCommand::Shutdown)
        .expect("Failed to send shutdown");

    handle.join().expect("Worker thread panicked");
    assert!(shutdown_received.load(Ordering::Acquire));
}

// ============================================================================
// DeviceEvent Flow Tests
// ============================================================================

#[tokio::test]
async fn test_attach_detach_events_preserve_order() {
    let (bridge, worker) = create_monitor_bridge();

    let handle = thread::spawn(move || {
        worker
            .send_event(DeviceEvent::Connected(oak_identity("A1", 1)))
            .expect("Failed to send event");
        worker
            .send_event(DeviceEvent::Disconnected(oak_identity("A1", 1)))
            .expect("Failed to send event");
        worker
            .send_event(DeviceEvent::Connected(oak_identity("A1", 2)))
            .expect("Failed to send event");
    });

    let consumer = tokio::task::spawn_blocking(move || {
        (0..3)
            .map(|_| bridge.recv_event_blocking())
            .collect::<common::Result<Vec<_>>>()
    });
    let received = with_timeout(DEFAULT_TEST_TIMEOUT, consumer)
        .await
        .expect("Timed out")
        .expect("Consumer task panicked")
        .expect("Failed to receive event");

    assert_eq!(
        received,
        vec![
            DeviceEvent::Connected(oak_identity("A1", 1)),
            DeviceEvent::Disconnected(oak_identity("A1", 1)),
            DeviceEvent::Connected(oak_identity("A1", 2)),
        ]
    );

    handle.join().expect("Worker thread panicked");
}

#[test]
fn test_blocking_event_receive() {
    let (bridge, worker) = create_monitor_bridge();

    let handle = thread::spawn(move || bridge.recv_event_blocking());

    worker
        .send_event(DeviceEvent::Connected(oak_identity("B2", 9)))
        .expect("Failed to send event");

    let event = handle
        .join()
        .expect("Consumer thread panicked")
        .expect("Failed to receive event");
    assert_eq!(event, DeviceEvent::Connected(oak_identity("B2", 9)));
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_worker_try_recv_non_blocking() {
    let (_bridge, worker) = create_monitor_bridge();
    assert!(worker.try_recv_command().is_none());
    assert!(!worker.is_orphaned());
}

#[test]
fn test_worker_orphaned_on_bridge_drop() {
    let (bridge, worker) = create_monitor_bridge();
    let clone = bridge.clone();

    drop(bridge);
    assert!(!worker.is_orphaned());

    drop(clone);
    assert!(worker.is_orphaned());
    assert!(next_command(&worker).is_none());
}

#[tokio::test]
async fn test_bridge_send_fails_after_worker_drop() {
    let (bridge, worker) = create_monitor_bridge();
    drop(worker);

    let result = bridge.send_command(MonitorCommand::Shutdown).await;
    assert!(result.is_err());

    let event = bridge.recv_event_blocking();
    assert!(event.is_err());
}

#[test]
fn test_closed_events_unblock_consumer() {
    let (bridge, worker) = create_monitor_bridge();
    let consumer = bridge.clone();

    let handle = thread::spawn(move || consumer.recv_event_blocking());
    thread::sleep(Duration::from_millis(20));

    assert!(bridge.close_events());
    assert!(handle.join().expect("Consumer thread panicked").is_err());
    assert!(
        worker
            .send_event(DeviceEvent::Connected(oak_identity("A1", 1)))
            .is_err()
    );
}

// ============================================================================
// Capacity Tests
// ============================================================================

#[test]
fn test_full_event_queue_drops_instead_of_blocking() {
    let (bridge, worker) = create_monitor_bridge();

    let mut sent = 0u64;
    loop {
        let event = DeviceEvent::Connected(oak_identity("A1", sent));
        if worker.send_event(event).is_err() {
            break;
        }
        sent += 1;
        assert!(sent <= 1024, "event queue never filled");
    }
    assert_eq!(sent, 256);

    // Draining makes room again
    let first = bridge.recv_event_blocking().expect("Failed to receive event");
    assert_eq!(first, DeviceEvent::Connected(oak_identity("A1", 0)));
    assert!(
        worker
            .send_event(DeviceEvent::Disconnected(oak_identity("A1", 0)))
            .is_ok()
    );
}
