//! Channel bridge between the USB monitor thread and its consumers
//!
//! The monitor thread runs the libusb event loop and must never block on the
//! consumer. Device events are pushed with `try_send` so a stalled consumer
//! costs dropped events, never a wedged USB thread.

use crate::usb_types::DeviceIdentity;
use async_channel::{Receiver, Sender, TrySendError, bounded};

/// Commands to the USB monitor thread
#[derive(Debug)]
pub enum MonitorCommand {
    /// List currently connected devices that match the target filter
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<DeviceIdentity>>,
    },

    /// Shutdown the USB monitor thread gracefully
    Shutdown,
}

/// Hotplug events from the USB monitor thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Target device attached
    Connected(DeviceIdentity),
    /// Target device detached
    Disconnected(DeviceIdentity),
}

impl DeviceEvent {
    /// Identity carried by the event
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            DeviceEvent::Connected(identity) | DeviceEvent::Disconnected(identity) => identity,
        }
    }
}

/// Consumer-side handle (usable from blocking threads and from Tokio)
#[derive(Clone)]
pub struct MonitorBridge {
    cmd_tx: Sender<MonitorCommand>,
    event_rx: Receiver<DeviceEvent>,
}

impl MonitorBridge {
    /// Send a command to the monitor thread
    pub async fn send_command(&self, cmd: MonitorCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a command to the monitor thread (blocking)
    pub fn send_command_blocking(&self, cmd: MonitorCommand) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the monitor thread (blocking)
    pub fn recv_event_blocking(&self) -> crate::Result<DeviceEvent> {
        self.event_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Close the event side so pending and future receives return an error
    pub fn close_events(&self) -> bool {
        self.event_rx.close()
    }
}

/// Handle for the USB monitor thread (never blocks on the consumer)
pub struct MonitorWorker {
    cmd_rx: Receiver<MonitorCommand>,
    event_tx: Sender<DeviceEvent>,
}

impl MonitorWorker {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<MonitorCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Whether every bridge handle has been dropped
    pub fn is_orphaned(&self) -> bool {
        self.cmd_rx.is_closed()
    }

    /// Push an event to the consumer without blocking
    pub fn send_event(&self, event: DeviceEvent) -> crate::Result<()> {
        self.event_tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) => crate::Error::Channel(format!(
                "event queue full, dropped {:?}",
                event.identity()
            )),
            TrySendError::Closed(_) => crate::Error::Channel("event receiver closed".to_string()),
        })
    }
}

/// Create the channel bridge between the monitor thread and its consumer
///
/// Returns (MonitorBridge for the consumer, MonitorWorker for the USB thread)
pub fn create_monitor_bridge() -> (MonitorBridge, MonitorWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = bounded(256);

    (
        MonitorBridge { cmd_tx, event_rx },
        MonitorWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_monitor_bridge();

        // Spawn a thread to simulate the USB monitor
        let handle = std::thread::spawn(move || {
            loop {
                if let Some(cmd) = worker.try_recv_command() {
                    return matches!(cmd, MonitorCommand::ListDevices { .. });
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        });

        // Send command from async context
        let (tx, _rx) = tokio::sync::oneshot::channel();
        bridge
            .send_command(MonitorCommand::ListDevices { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_event_identity() {
        let identity = DeviceIdentity::new(0x03e7, 0x2485, "A1", 100);
        let event = DeviceEvent::Disconnected(identity.clone());
        assert_eq!(event.identity(), &identity);
    }
}
