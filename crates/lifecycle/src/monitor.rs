//! USB monitor seam
//!
//! The controller does not know how hotplug notifications are produced. An
//! adapter implementing [`UsbMonitor`] watches for the target device and calls
//! a [`DeviceEventHandler`] on attach and detach.

use crate::error::Fault;
use common::TargetFilter;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

/// Receiver of attach/detach notifications
///
/// Calls may arrive on a thread the receiver does not control. A detach can
/// block the calling thread for the camera's stop grace period plus the
/// forced-kill wait (10 s + 5 s by default) while the process is stopped, so
/// adapters must not call this from a thread that services USB events.
pub trait DeviceEventHandler: Send + Sync {
    fn on_device_connected(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: &str,
        service_id: u64,
    );

    fn on_device_disconnected(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: &str,
        service_id: u64,
    );
}

/// Opaque token for an active monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSourceHandle(NonZeroU64);

impl EventSourceHandle {
    pub fn new(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> NonZeroU64 {
        self.0
    }
}

impl fmt::Display for EventSourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-source#{}", self.0)
    }
}

/// Hotplug adapter owning its own monitoring resources
pub trait UsbMonitor: Send {
    /// Begin delivering events for devices matching `filter`
    ///
    /// Devices already present may be reported as attach events.
    fn start_monitoring(
        &mut self,
        handler: Arc<dyn DeviceEventHandler>,
        filter: TargetFilter,
    ) -> Result<EventSourceHandle, Fault>;

    /// Release every resource acquired by `start_monitoring`
    ///
    /// Safe to call repeatedly and when monitoring never started.
    fn stop_monitoring(&mut self);
}
