//! rusb implementation of the controller's monitor seam

use crate::usb::worker::MonitorThread;
use anyhow::{Context, Result, anyhow};
use common::{
    DeviceEvent, DeviceIdentity, MonitorBridge, MonitorCommand, TargetFilter,
    create_monitor_bridge,
};
use lifecycle::{DeviceEventHandler, EventSourceHandle, Fault, UsbMonitor};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

struct Session {
    bridge: MonitorBridge,
    worker: JoinHandle<()>,
    handle: EventSourceHandle,
}

/// Hotplug monitor backed by libusb
#[derive(Default)]
pub struct RusbMonitor {
    session: Option<Session>,
    sessions_started: u64,
}

impl RusbMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the active session, if any
    pub fn active_handle(&self) -> Option<EventSourceHandle> {
        self.session.as_ref().map(|s| s.handle)
    }

    fn next_handle(&mut self) -> EventSourceHandle {
        let handle = EventSourceHandle::new(NonZeroU64::MIN.saturating_add(self.sessions_started));
        self.sessions_started += 1;
        handle
    }
}

impl UsbMonitor for RusbMonitor {
    fn start_monitoring(
        &mut self,
        handler: Arc<dyn DeviceEventHandler>,
        filter: TargetFilter,
    ) -> Result<EventSourceHandle, Fault> {
        self.stop_monitoring();

        if !rusb::has_hotplug() {
            return Err(Fault::MonitorInit(
                "libusb was built without hotplug support".to_string(),
            ));
        }

        let (bridge, worker) = create_monitor_bridge();
        let worker = MonitorThread::spawn(worker, filter)?;

        let events = bridge.clone();
        let dispatcher = std::thread::Builder::new()
            .name("usb-dispatch".to_string())
            .spawn(move || dispatch_events(events, handler));
        if let Err(e) = dispatcher {
            let _ = bridge.send_command_blocking(MonitorCommand::Shutdown);
            let _ = worker.join();
            return Err(Fault::MonitorInit(format!(
                "cannot spawn event dispatcher: {}",
                e
            )));
        }

        let handle = self.next_handle();
        debug!("Started {} for {}", handle, filter);
        self.session = Some(Session {
            bridge,
            worker,
            handle,
        });
        Ok(handle)
    }

    fn stop_monitoring(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.bridge.send_command_blocking(MonitorCommand::Shutdown) {
            debug!("USB monitor already gone: {}", e);
        }
        session.bridge.close_events();
        if session.worker.join().is_err() {
            warn!("USB monitor thread panicked");
        }
        info!("Stopped {}", session.handle);
    }
}

impl Drop for RusbMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

/// Forward events to the handler until the monitor thread goes away
///
/// Runs on its own thread since a detach may block for the camera's stop
/// timeout, and the USB thread must keep servicing libusb meanwhile.
fn dispatch_events(bridge: MonitorBridge, handler: Arc<dyn DeviceEventHandler>) {
    while let Ok(event) = bridge.recv_event_blocking() {
        match event {
            DeviceEvent::Connected(d) => handler.on_device_connected(
                d.vendor_id,
                d.product_id,
                &d.serial_number,
                d.service_id,
            ),
            DeviceEvent::Disconnected(d) => handler.on_device_disconnected(
                d.vendor_id,
                d.product_id,
                &d.serial_number,
                d.service_id,
            ),
        }
    }
    debug!("Event dispatcher stopped");
}

/// List attached devices matching `filter` without starting the controller
pub async fn list_target_devices(filter: TargetFilter) -> Result<Vec<DeviceIdentity>> {
    let (bridge, worker) = create_monitor_bridge();
    let handle = tokio::task::spawn_blocking(move || MonitorThread::spawn(worker, filter))
        .await
        .context("USB monitor startup task failed")?
        .map_err(|fault| anyhow!("{}: {}", fault.title(), fault))?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    bridge
        .send_command(MonitorCommand::ListDevices { response: tx })
        .await
        .context("Failed to send ListDevices command")?;
    let devices = rx.await.context("Failed to receive device list")?;

    bridge
        .send_command(MonitorCommand::Shutdown)
        .await
        .context("Failed to send Shutdown command")?;
    tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("USB monitor join task failed")?
        .map_err(|_| anyhow!("USB monitor thread panicked"))?;

    Ok(devices)
}
