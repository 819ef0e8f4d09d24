//! USB monitor thread
//!
//! Owns the libusb context and hotplug registration, runs the
//! `handle_events` loop and turns hotplug notices into [`DeviceEvent`]s for
//! the target device.

use crate::usb::device;
use common::{DeviceEvent, DeviceIdentity, MonitorCommand, MonitorWorker, TargetFilter};
use lifecycle::Fault;
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

enum HotplugNotice {
    Arrived(Device<Context>),
    Left(Device<Context>),
}

type NoticeQueue = Arc<Mutex<VecDeque<HotplugNotice>>>;

/// Hotplug callback that only records what happened
///
/// libusb forbids most synchronous calls, opening the device included, from
/// inside a hotplug callback.
struct QueueingCallback {
    queue: NoticeQueue,
}

impl QueueingCallback {
    fn push(&self, notice: HotplugNotice) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(notice);
    }
}

impl Hotplug<Context> for QueueingCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.push(HotplugNotice::Arrived(device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.push(HotplugNotice::Left(device));
    }
}

/// State of the `usb-monitor` thread
pub struct MonitorThread {
    context: Context,
    filter: TargetFilter,
    worker: MonitorWorker,
    queue: NoticeQueue,
    /// Target devices currently attached, by (bus, address)
    present: HashMap<(u8, u8), DeviceIdentity>,
    _registration: Registration<Context>,
}

impl MonitorThread {
    /// Create the libusb context and register for the target's hotplug events
    ///
    /// Devices already attached are queued as arrivals.
    pub fn new(worker: MonitorWorker, filter: TargetFilter) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        let queue: NoticeQueue = Arc::new(Mutex::new(VecDeque::new()));

        let callback = QueueingCallback {
            queue: Arc::clone(&queue),
        };
        let registration = HotplugBuilder::new()
            .vendor_id(filter.vendor_id)
            .product_id(filter.product_id)
            .enumerate(true)
            .register(&context, Box::new(callback))?;

        debug!("Hot-plug callback registered for {}", filter);

        Ok(Self {
            context,
            filter,
            worker,
            queue,
            present: HashMap::new(),
            _registration: registration,
        })
    }

    /// Spawn the thread and wait until initial enumeration was processed
    pub fn spawn(worker: MonitorWorker, filter: TargetFilter) -> Result<JoinHandle<()>, Fault> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let handle = std::thread::Builder::new()
            .name("usb-monitor".to_string())
            .spawn(move || {
                let mut thread = match MonitorThread::new(worker, filter) {
                    Ok(thread) => thread,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                thread.drain_notices();
                let _ = ready_tx.send(Ok(()));
                thread.run();
            })
            .map_err(|e| Fault::MonitorInit(format!("cannot spawn USB thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(Fault::MonitorInit(reason))
            }
            Err(_) => {
                let _ = handle.join();
                Err(Fault::MonitorInit(
                    "USB thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Run the event loop until shutdown or until every bridge handle is gone
    pub fn run(mut self) {
        info!("USB monitor thread started");

        loop {
            match self.worker.try_recv_command() {
                Some(MonitorCommand::Shutdown) => {
                    info!("USB monitor shutting down");
                    break;
                }
                Some(MonitorCommand::ListDevices { response }) => {
                    let devices = self.present_devices();
                    debug!("Listing {} target devices", devices.len());
                    let _ = response.send(devices);
                }
                None if self.worker.is_orphaned() => {
                    debug!("All monitor handles dropped");
                    break;
                }
                None => {}
            }

            match self.context.handle_events(Some(EVENT_POLL_INTERVAL)) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(EVENT_POLL_INTERVAL);
                }
            }

            self.drain_notices();
        }

        info!("USB monitor thread stopped");
    }

    fn present_devices(&self) -> Vec<DeviceIdentity> {
        let mut devices: Vec<_> = self.present.values().cloned().collect();
        devices.sort_by_key(|d| d.service_id);
        devices
    }

    fn drain_notices(&mut self) {
        loop {
            // Pop one at a time; identification opens the device and must not
            // run with the queue locked
            let notice = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match notice {
                Some(HotplugNotice::Arrived(device)) => self.on_arrived(device),
                Some(HotplugNotice::Left(device)) => self.on_left(device),
                None => break,
            }
        }
    }

    fn on_arrived(&mut self, device: Device<Context>) {
        let key = (device.bus_number(), device.address());
        let Some(identity) = device::identify(&device, &self.filter) else {
            return;
        };

        info!("Target device attached: {}", identity);
        self.present.insert(key, identity.clone());
        self.emit(DeviceEvent::Connected(identity));
    }

    fn on_left(&mut self, device: Device<Context>) {
        let key = (device.bus_number(), device.address());
        let identity = match self.present.remove(&key) {
            Some(identity) => identity,
            None => match device::identify_departed(&device, &self.filter) {
                Some(identity) => identity,
                None => return,
            },
        };

        info!("Target device detached: {}", identity);
        self.emit(DeviceEvent::Disconnected(identity));
    }

    fn emit(&self, event: DeviceEvent) {
        if let Err(e) = self.worker.send_event(event) {
            error!("Failed to deliver device event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::create_monitor_bridge;
    use common::test_utils::OAK_FILTER;

    #[test]
    fn test_monitor_thread_creation() {
        let (_bridge, worker) = create_monitor_bridge();

        // Context creation may fail without USB access; both outcomes are fine
        match MonitorThread::new(worker, OAK_FILTER) {
            Ok(thread) => assert!(thread.present.is_empty()),
            Err(e) => println!("USB not available in test environment: {}", e),
        }
    }

    #[test]
    fn test_spawned_thread_shuts_down() {
        let (bridge, worker) = create_monitor_bridge();

        match MonitorThread::spawn(worker, OAK_FILTER) {
            Ok(handle) => {
                bridge.send_command_blocking(MonitorCommand::Shutdown).unwrap();
                handle.join().unwrap();
            }
            Err(fault) => assert!(matches!(fault, Fault::MonitorInit(_))),
        }
    }

    #[test]
    fn test_thread_exits_when_bridge_dropped() {
        let (bridge, worker) = create_monitor_bridge();

        if let Ok(handle) = MonitorThread::spawn(worker, OAK_FILTER) {
            drop(bridge);
            handle.join().unwrap();
        }
    }
}
