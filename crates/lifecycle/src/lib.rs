//! Lifecycle engine for uvc-autoctl
//!
//! Watches for one USB camera through a [`UsbMonitor`] and drives the external
//! camera pipeline process through a [`ProcessSupervisor`]. The [`Controller`]
//! ties the two together under the user-togglable auto mode and reports every
//! change through [`UiCallbacks`].

pub mod controller;
pub mod error;
pub mod monitor;
pub mod policy;
pub mod supervisor;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tracker;
pub mod ui;

pub use controller::{Controller, DEFAULT_DEVICE_LABEL};
pub use error::Fault;
pub use monitor::{DeviceEventHandler, EventSourceHandle, UsbMonitor};
pub use policy::AutoMode;
pub use supervisor::{
    CommandLauncher, LaunchTarget, ManagedChild, OsChild, ProcessLauncher, ProcessSupervisor,
    START_STREAMING_FLAG, StartOutcome, StopOutcome, StopTimeouts,
};
pub use tracker::DeviceTracker;
pub use ui::{StatusLabel, UiCallbacks};
