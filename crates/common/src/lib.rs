//! Common utilities for uvc-autoctl
//!
//! This crate provides shared functionality between the lifecycle engine and
//! the agent binary: USB device identity types, error handling, logging setup,
//! and the channel bridge between the USB monitor thread and its consumers.

pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod usb_types;

pub use channel::{DeviceEvent, MonitorBridge, MonitorCommand, MonitorWorker, create_monitor_bridge};
pub use error::{Error, Result};
pub use logging::{setup_file_logging, setup_logging};
pub use usb_types::{DeviceIdentity, TargetFilter, service_id_for};
