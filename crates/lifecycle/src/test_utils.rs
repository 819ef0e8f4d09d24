//! Test doubles for the lifecycle engine
//!
//! A recording [`UiCallbacks`] implementation, a scripted process launcher
//! whose children behave as told when signalled, and a monitor that lets a
//! test drive attach/detach events by hand.

use crate::error::Fault;
use crate::monitor::{DeviceEventHandler, EventSourceHandle, UsbMonitor};
use crate::supervisor::{LaunchTarget, ManagedChild, ProcessLauncher};
use crate::ui::{StatusLabel, UiCallbacks};
use common::{DeviceIdentity, TargetFilter};
use std::io;
use std::num::NonZeroU64;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// One recorded UI callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCall {
    Notify {
        title: String,
        subtitle: String,
        message: String,
    },
    Alert {
        title: String,
        message: String,
    },
    MenuState(bool),
    StatusLabel(StatusLabel),
}

impl UiCall {
    pub fn notify(title: &str, subtitle: &str, message: &str) -> Self {
        UiCall::Notify {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            message: message.to_string(),
        }
    }

    pub fn alert(title: &str, message: &str) -> Self {
        UiCall::Alert {
            title: title.to_string(),
            message: message.to_string(),
        }
    }
}

/// UI that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingUi {
    calls: Mutex<Vec<UiCall>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: UiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<UiCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Recorded notifications as (title, subtitle, message)
    pub fn notifications(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                UiCall::Notify {
                    title,
                    subtitle,
                    message,
                } => Some((title, subtitle, message)),
                _ => None,
            })
            .collect()
    }

    /// Recorded alerts as (title, message)
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                UiCall::Alert { title, message } => Some((title, message)),
                _ => None,
            })
            .collect()
    }

    pub fn menu_states(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                UiCall::MenuState(enabled) => Some(enabled),
                _ => None,
            })
            .collect()
    }

    pub fn labels(&self) -> Vec<StatusLabel> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                UiCall::StatusLabel(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    pub fn last_label(&self) -> Option<StatusLabel> {
        self.labels().last().copied()
    }
}

impl UiCallbacks for RecordingUi {
    fn notify(&self, title: &str, subtitle: &str, message: &str) {
        self.record(UiCall::notify(title, subtitle, message));
    }

    fn alert(&self, title: &str, message: &str) {
        self.record(UiCall::alert(title, message));
    }

    fn update_menu_state(&self, auto_mode_enabled: bool) {
        self.record(UiCall::MenuState(auto_mode_enabled));
    }

    fn update_status_label(&self, label: StatusLabel) {
        self.record(UiCall::StatusLabel(label));
    }
}

/// How a scripted child reacts to being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBehavior {
    /// Exits as soon as SIGINT arrives
    #[default]
    ExitOnInterrupt,
    /// Keeps running until killed, so every grace wait times out
    IgnoreInterrupt,
    /// Signal delivery itself fails
    InterruptFails,
}

/// Counters shared between a [`ScriptedLauncher`] and the test
#[derive(Debug, Default)]
pub struct ChildCounters {
    launches: AtomicUsize,
    interrupts: AtomicUsize,
    kills: AtomicUsize,
    crash_code: Mutex<Option<i32>>,
}

impl ChildCounters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Make the current child exit on its own with `code`
    pub fn crash(&self, code: i32) {
        *self.crash_code.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    fn take_crash(&self) -> Option<i32> {
        self.crash_code
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

struct ScriptedChild {
    id: u32,
    behavior: StopBehavior,
    counters: Arc<ChildCounters>,
    exit: Option<ExitStatus>,
}

impl ManagedChild for ScriptedChild {
    fn id(&self) -> u32 {
        self.id
    }

    fn interrupt(&mut self) -> io::Result<()> {
        self.counters.interrupts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            StopBehavior::ExitOnInterrupt => {
                self.exit.get_or_insert(ExitStatus::from_raw(0));
                Ok(())
            }
            StopBehavior::IgnoreInterrupt => Ok(()),
            StopBehavior::InterruptFails => Err(io::Error::other("signal delivery failed")),
        }
    }

    fn wait_timeout(&mut self, _timeout: Duration) -> io::Result<Option<ExitStatus>> {
        self.try_wait()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.counters.kills.fetch_add(1, Ordering::SeqCst);
        // killed by SIGKILL
        self.exit.get_or_insert(ExitStatus::from_raw(9));
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(code) = self.counters.take_crash() {
            self.exit.get_or_insert(ExitStatus::from_raw(code << 8));
        }
        Ok(self.exit)
    }
}

/// Launcher producing [`StopBehavior`]-scripted children
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    behavior: StopBehavior,
    spawn_error: Option<io::ErrorKind>,
    counters: Arc<ChildCounters>,
}

impl ScriptedLauncher {
    pub fn new(behavior: StopBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Launcher whose every spawn fails with `kind`
    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            spawn_error: Some(kind),
            ..Self::default()
        }
    }

    pub fn counters(&self) -> Arc<ChildCounters> {
        self.counters.clone()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(&self, _target: &LaunchTarget) -> io::Result<Box<dyn ManagedChild>> {
        if let Some(kind) = self.spawn_error {
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }
        let n = self.counters.launches.fetch_add(1, Ordering::SeqCst) as u32;
        Ok(Box::new(ScriptedChild {
            id: 4000 + n,
            behavior: self.behavior,
            counters: self.counters.clone(),
            exit: None,
        }))
    }
}

/// Shared view of a [`ManualMonitor`]
#[derive(Default)]
pub struct ManualMonitorState {
    handler: Mutex<Option<(Arc<dyn DeviceEventHandler>, TargetFilter)>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
}

impl ManualMonitorState {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn handler(&self) -> Option<Arc<dyn DeviceEventHandler>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(handler, _)| handler.clone())
    }

    /// Deliver an attach to the registered handler, if monitoring is active
    pub fn attach(&self, device: &DeviceIdentity) -> bool {
        let Some(handler) = self.handler() else {
            return false;
        };
        handler.on_device_connected(
            device.vendor_id,
            device.product_id,
            &device.serial_number,
            device.service_id,
        );
        true
    }

    /// Deliver a detach to the registered handler, if monitoring is active
    pub fn detach(&self, device: &DeviceIdentity) -> bool {
        let Some(handler) = self.handler() else {
            return false;
        };
        handler.on_device_disconnected(
            device.vendor_id,
            device.product_id,
            &device.serial_number,
            device.service_id,
        );
        true
    }
}

/// Monitor whose events are injected by the test
#[derive(Default)]
pub struct ManualMonitor {
    state: Arc<ManualMonitorState>,
}

impl ManualMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor whose `start_monitoring` fails
    pub fn failing() -> Self {
        let monitor = Self::default();
        monitor.state.fail_start.store(true, Ordering::SeqCst);
        monitor
    }

    pub fn state(&self) -> Arc<ManualMonitorState> {
        self.state.clone()
    }
}

impl UsbMonitor for ManualMonitor {
    fn start_monitoring(
        &mut self,
        handler: Arc<dyn DeviceEventHandler>,
        filter: TargetFilter,
    ) -> Result<EventSourceHandle, Fault> {
        if self.state.fail_start.load(Ordering::SeqCst) {
            return Err(Fault::MonitorInit("hotplug not supported".to_string()));
        }
        let n = self.state.starts.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        *self
            .state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((handler, filter));
        NonZeroU64::new(n)
            .map(EventSourceHandle::new)
            .ok_or_else(|| Fault::MonitorInit("handle overflow".to_string()))
    }

    fn stop_monitoring(&mut self) {
        let previous = self
            .state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            self.state.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}
