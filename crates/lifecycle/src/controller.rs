//! Connection state machine
//!
//! Reconciles attach/detach events from the USB monitor with the camera
//! process and the auto-mode setting. All state sits behind one mutex that is
//! held for each whole operation, including the UI callbacks it makes, so
//! operations from the USB thread and the UI thread never interleave.

use crate::monitor::{DeviceEventHandler, EventSourceHandle, UsbMonitor};
use crate::policy::{self, AttachAction, AutoMode, ToggleAction};
use crate::supervisor::ProcessSupervisor;
use crate::tracker::DeviceTracker;
use crate::ui::UiCallbacks;
use common::{DeviceIdentity, TargetFilter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info};

/// Label used in notifications when none is configured
pub const DEFAULT_DEVICE_LABEL: &str = "OAK-D Lite";

struct State {
    tracker: DeviceTracker,
    supervisor: ProcessSupervisor,
    auto_mode: AutoMode,
    monitor: Option<Box<dyn UsbMonitor>>,
    event_source: Option<EventSourceHandle>,
    shut_down: bool,
}

/// Device presence driven camera controller
///
/// Public methods never fail; problems are reported through
/// [`UiCallbacks::alert`] and the state is repaired.
pub struct Controller<U: UiCallbacks> {
    ui: U,
    device_label: String,
    state: Mutex<State>,
}

impl<U: UiCallbacks> Controller<U> {
    pub fn new(
        ui: U,
        filter: TargetFilter,
        supervisor: ProcessSupervisor,
        auto_mode_enabled: bool,
    ) -> Self {
        Self {
            ui,
            device_label: DEFAULT_DEVICE_LABEL.to_string(),
            state: Mutex::new(State {
                tracker: DeviceTracker::new(filter),
                supervisor,
                auto_mode: AutoMode::new(auto_mode_enabled),
                monitor: None,
                event_source: None,
                shut_down: false,
            }),
        }
    }

    /// Name of the device as shown in notifications
    pub fn with_device_label(mut self, label: impl Into<String>) -> Self {
        self.device_label = label.into();
        self
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    // A panic inside a callback must not wedge the agent; the state is still
    // structurally valid, so recover it
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push the current auto-mode and status label to the UI
    pub fn sync_ui(&self) {
        let state = self.lock();
        self.ui.update_menu_state(state.auto_mode.is_enabled());
        self.ui.update_status_label(state.supervisor.status_label());
    }

    /// Handle an attach reported by the monitor
    pub fn handle_attach(&self, device: DeviceIdentity) {
        let mut state = self.lock();
        if state.shut_down {
            debug!("Ignoring attach of {} after shutdown", device);
            return;
        }
        let State {
            tracker,
            supervisor,
            auto_mode,
            ..
        } = &mut *state;

        if tracker.on_attach(device.clone()) {
            info!("Target device attached: {}", device);
            self.ui.notify(
                "OAK-D Status",
                "Device Connected",
                &format!(
                    "{} (SN: {}) detected.",
                    self.device_label, device.serial_number
                ),
            );

            match policy::on_attach(auto_mode.is_enabled(), supervisor.is_running()) {
                AttachAction::StartCamera => {
                    self.ui.notify(
                        "OAK-D Auto Control",
                        "Starting Camera",
                        "Device connected, auto-starting camera.",
                    );
                    supervisor.start(&self.ui);
                }
                AttachAction::AlreadyRunning => {
                    self.ui.notify(
                        "OAK-D Auto Control",
                        "Info",
                        "Camera already running or starting.",
                    );
                }
                AttachAction::Nothing => {
                    debug!("Auto mode disabled, leaving camera stopped");
                }
            }
        }

        self.ui.update_status_label(supervisor.status_label());
    }

    /// Handle a detach reported by the monitor
    pub fn handle_detach(&self, device: DeviceIdentity) {
        let mut state = self.lock();
        if state.shut_down {
            debug!("Ignoring detach of {} after shutdown", device);
            return;
        }
        let State {
            tracker,
            supervisor,
            ..
        } = &mut *state;

        if tracker.on_detach(&device) {
            info!("Target device detached: {}", device);
            self.ui.notify(
                "OAK-D Status",
                "Device Disconnected",
                &format!(
                    "{} (SN: {}) disconnected.",
                    self.device_label, device.serial_number
                ),
            );

            if supervisor.is_running() {
                self.ui.notify(
                    "OAK-D Control",
                    "Stopping Camera",
                    "Device disconnected, stopping camera.",
                );
                supervisor.stop(&self.ui);
            }
        }

        self.ui.update_status_label(supervisor.status_label());
    }

    /// Flip auto mode and bring the camera in line with it
    pub fn toggle_auto_mode(&self) {
        let mut state = self.lock();
        if state.shut_down {
            debug!("Ignoring auto mode toggle after shutdown");
            return;
        }
        let State {
            tracker,
            supervisor,
            auto_mode,
            ..
        } = &mut *state;

        let enabled = auto_mode.toggle();
        let setting = if enabled { "enabled" } else { "disabled" };
        info!("Auto mode {}", setting);
        self.ui.update_menu_state(enabled);
        self.ui.notify(
            "OAK-D Auto Control",
            "Setting Changed",
            &format!("Auto Camera Control has been {}.", setting),
        );

        match policy::on_toggle(enabled, tracker.is_present(), supervisor.is_running()) {
            ToggleAction::StartCamera => {
                self.ui.notify(
                    "OAK-D Auto Control",
                    "Starting Camera",
                    "Device already connected, auto-starting camera.",
                );
                supervisor.start(&self.ui);
            }
            ToggleAction::StopCamera => {
                self.ui.notify(
                    "OAK-D Auto Control",
                    "Stopping Camera",
                    "Auto mode disabled, stopping camera.",
                );
                supervisor.stop(&self.ui);
            }
            ToggleAction::Nothing => {}
        }

        self.ui.update_status_label(supervisor.status_label());
    }

    /// Stop the camera on the user's request
    ///
    /// Auto mode is switched off first so the still-attached device does not
    /// bring the camera straight back.
    pub fn disconnect_camera_explicitly(&self) {
        let mut state = self.lock();
        let State {
            supervisor,
            auto_mode,
            ..
        } = &mut *state;

        if !supervisor.is_running() {
            self.ui
                .notify("OAK-D Camera", "Status", "Camera is not currently running.");
            self.ui.update_status_label(supervisor.status_label());
            return;
        }

        if auto_mode.force_off() {
            info!("Auto mode disabled by manual disconnect");
            self.ui.update_menu_state(false);
            self.ui.notify(
                "OAK-D Auto Control",
                "Disabled",
                "Auto-mode disabled due to manual disconnect.",
            );
        }

        supervisor.stop(&self.ui);
        self.ui.notify(
            "OAK-D Camera",
            "Disconnected",
            "Camera has been manually disconnected.",
        );
        self.ui.update_status_label(supervisor.status_label());
    }

    /// Check whether the camera process died on its own
    ///
    /// Returns `true` when a dead process was found and cleaned up.
    pub fn reap_exited(&self) -> bool {
        let mut state = self.lock();
        if state.shut_down {
            return false;
        }
        state.supervisor.reap(&self.ui)
    }

    /// Stop monitoring and the camera; later events are ignored
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shut_down {
            debug!("Controller already shut down");
            return;
        }
        state.shut_down = true;
        info!("Shutting down lifecycle controller");

        if let Some(mut monitor) = state.monitor.take() {
            monitor.stop_monitoring();
        }
        state.event_source = None;

        if state.supervisor.is_running() {
            state.supervisor.stop(&self.ui);
        } else {
            self.ui.update_status_label(state.supervisor.status_label());
        }
    }

    pub fn is_camera_running(&self) -> bool {
        self.lock().supervisor.is_running()
    }

    pub fn is_auto_mode_enabled(&self) -> bool {
        self.lock().auto_mode.is_enabled()
    }

    pub fn tracked_device(&self) -> Option<DeviceIdentity> {
        self.lock().tracker.current().cloned()
    }

    pub fn event_source(&self) -> Option<EventSourceHandle> {
        self.lock().event_source
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }
}

impl<U: UiCallbacks + 'static> Controller<U> {
    /// Start delivering USB events from `monitor` to this controller
    ///
    /// On failure the user is alerted and the controller keeps working
    /// without hotplug events. The monitor only holds a weak reference, so it
    /// never keeps the controller alive.
    pub fn start_monitoring(
        self: &Arc<Self>,
        mut monitor: Box<dyn UsbMonitor>,
    ) -> Option<EventSourceHandle> {
        let filter = self.lock().tracker.filter();
        let handler: Arc<dyn DeviceEventHandler> = Arc::new(WeakHandler {
            controller: Arc::downgrade(self),
        });

        // Initial enumeration may deliver events right away, so the state lock
        // must not be held here
        let result = monitor.start_monitoring(handler, filter);

        let mut state = self.lock();
        match result {
            Ok(handle) => {
                if state.shut_down {
                    debug!(
                        "Controller shut down while monitoring started, stopping {}",
                        handle
                    );
                    monitor.stop_monitoring();
                    return None;
                }
                if let Some(mut previous) = state.monitor.take() {
                    previous.stop_monitoring();
                }
                info!("Monitoring {} for {}", filter, handle);
                state.monitor = Some(monitor);
                state.event_source = Some(handle);
                Some(handle)
            }
            Err(fault) => {
                error!("{}; continuing without hotplug events", fault);
                self.ui.alert(fault.title(), &fault.to_string());
                self.ui.update_status_label(state.supervisor.status_label());
                None
            }
        }
    }
}

impl<U: UiCallbacks> DeviceEventHandler for Controller<U> {
    fn on_device_connected(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: &str,
        service_id: u64,
    ) {
        self.handle_attach(DeviceIdentity::new(
            vendor_id,
            product_id,
            serial_number,
            service_id,
        ));
    }

    fn on_device_disconnected(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: &str,
        service_id: u64,
    ) {
        self.handle_detach(DeviceIdentity::new(
            vendor_id,
            product_id,
            serial_number,
            service_id,
        ));
    }
}

struct WeakHandler<U: UiCallbacks> {
    controller: Weak<Controller<U>>,
}

impl<U: UiCallbacks> DeviceEventHandler for WeakHandler<U> {
    fn on_device_connected(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: &str,
        service_id: u64,
    ) {
        match self.controller.upgrade() {
            Some(controller) => {
                controller.on_device_connected(vendor_id, product_id, serial_number, service_id)
            }
            None => debug!("Controller gone, dropping attach event"),
        }
    }

    fn on_device_disconnected(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: &str,
        service_id: u64,
    ) {
        match self.controller.upgrade() {
            Some(controller) => {
                controller.on_device_disconnected(vendor_id, product_id, serial_number, service_id)
            }
            None => debug!("Controller gone, dropping detach event"),
        }
    }
}
