//! USB hotplug adapter
//!
//! libusb events are serviced on a dedicated `usb-monitor` thread. Hotplug
//! callbacks only queue notices; the thread identifies devices outside the
//! callback and a separate dispatcher thread hands events to the controller,
//! whose detach handling may block for the camera's stop timeout.

pub mod device;
pub mod monitor;
pub mod worker;

pub use monitor::{RusbMonitor, list_target_devices};
