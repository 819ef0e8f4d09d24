//! Camera process supervision
//!
//! Owns the one external camera pipeline process. Stopping is graceful first
//! (SIGINT, then a bounded wait) and forced after (SIGKILL, then a second
//! bounded wait). Every path leaves the supervisor with `running == false` and
//! no handle, and every start/stop path ends by pushing the status label.

use crate::error::Fault;
use crate::ui::{StatusLabel, UiCallbacks};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Flag that puts the launch target into UVC streaming mode
pub const START_STREAMING_FLAG: &str = "--start-uvc";

/// Poll interval while waiting on a child with a deadline
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Program run to bring the camera up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Script or executable that streams the camera
    pub script: PathBuf,
    /// Interpreter the script is handed to, if it is not directly executable
    pub interpreter: Option<OsString>,
    pub args: Vec<OsString>,
}

impl LaunchTarget {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            interpreter: None,
            args: vec![START_STREAMING_FLAG.into()],
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<OsString>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn exists(&self) -> bool {
        self.script.exists()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

/// Grace period for SIGINT and wait after SIGKILL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    pub grace: Duration,
    pub kill_wait: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            kill_wait: Duration::from_secs(5),
        }
    }
}

/// A running child process as seen by the supervisor
pub trait ManagedChild: Send {
    fn id(&self) -> u32;

    /// Ask the process to shut down (SIGINT)
    fn interrupt(&mut self) -> io::Result<()>;

    /// Wait for exit, giving up after `timeout`
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>>;

    /// Force the process down (SIGKILL)
    fn kill(&mut self) -> io::Result<()>;

    /// Poll for exit without blocking
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
}

/// Spawns the launch target
pub trait ProcessLauncher: Send {
    fn launch(&self, target: &LaunchTarget) -> io::Result<Box<dyn ManagedChild>>;
}

/// [`ManagedChild`] backed by an OS process
#[derive(Debug)]
pub struct OsChild {
    child: Child,
}

impl OsChild {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl ManagedChild for OsChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        let pid = i32::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGINT)?;
        Ok(())
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        // A timeout past the clock's range means no deadline at all
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    WAIT_POLL_INTERVAL.min(deadline - now)
                }
                None => WAIT_POLL_INTERVAL,
            };
            std::thread::sleep(pause);
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}

/// Launches the target with `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl CommandLauncher {
    fn command(target: &LaunchTarget) -> Command {
        let mut command = match &target.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&target.script);
                command
            }
            None => Command::new(&target.script),
        };
        command.args(&target.args).stdin(Stdio::null());
        command
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, target: &LaunchTarget) -> io::Result<Box<dyn ManagedChild>> {
        let child = Self::command(target).spawn()?;
        Ok(Box::new(OsChild::new(child)))
    }
}

/// Result of [`ProcessSupervisor::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning,
    TargetMissing,
    SpawnFailed,
}

/// Result of [`ProcessSupervisor::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    Graceful,
    KilledAfterTimeout,
    KilledAfterError,
    StateReset,
}

/// Lifecycle of the single camera process
pub struct ProcessSupervisor {
    launcher: Box<dyn ProcessLauncher>,
    target: LaunchTarget,
    timeouts: StopTimeouts,
    running: bool,
    child: Option<Box<dyn ManagedChild>>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Box<dyn ProcessLauncher>, target: LaunchTarget) -> Self {
        Self {
            launcher,
            target,
            timeouts: StopTimeouts::default(),
            running: false,
            child: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: StopTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn target(&self) -> &LaunchTarget {
        &self.target
    }

    pub fn timeouts(&self) -> StopTimeouts {
        self.timeouts
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn child_id(&self) -> Option<u32> {
        self.child.as_ref().map(|child| child.id())
    }

    pub fn status_label(&self) -> StatusLabel {
        StatusLabel::from_running(self.running)
    }

    /// Start the camera process unless it is already running
    pub fn start(&mut self, ui: &dyn UiCallbacks) -> StartOutcome {
        let outcome = self.start_inner(ui);
        ui.update_status_label(self.status_label());
        outcome
    }

    fn start_inner(&mut self, ui: &dyn UiCallbacks) -> StartOutcome {
        if self.running {
            debug!("Camera already running, not starting another process");
            return StartOutcome::AlreadyRunning;
        }

        if !self.target.exists() {
            let fault = Fault::LaunchTargetMissing {
                path: self.target.script.clone(),
            };
            error!("{}", fault);
            ui.alert(fault.title(), &fault.to_string());
            return StartOutcome::TargetMissing;
        }

        match self.launcher.launch(&self.target) {
            Ok(child) => {
                let pid = child.id();
                info!(
                    "Started camera process {} ({})",
                    pid,
                    self.target.script.display()
                );
                self.child = Some(child);
                self.running = true;
                ui.notify("OAK-D Camera", "Status", "Camera starting...");
                StartOutcome::Started { pid }
            }
            Err(e) => {
                let fault = Fault::SpawnFailed(e);
                error!("Failed to start camera process: {}", fault);
                ui.alert(fault.title(), &fault.to_string());
                // spawn either returns a child or nothing, so there is no
                // half-created process to clean up
                self.child = None;
                self.running = false;
                StartOutcome::SpawnFailed
            }
        }
    }

    /// Stop the camera process, forcing it down if it does not cooperate
    pub fn stop(&mut self, ui: &dyn UiCallbacks) -> StopOutcome {
        let outcome = match (self.running, self.child.take()) {
            (false, _) => {
                ui.notify("OAK-D Camera", "Status", "Camera is already stopped.");
                StopOutcome::AlreadyStopped
            }
            (true, None) => {
                let fault = Fault::StateInconsistent;
                warn!("Camera marked running without a process handle");
                ui.alert(fault.title(), &fault.to_string());
                StopOutcome::StateReset
            }
            (true, Some(mut child)) => self.terminate(child.as_mut(), ui),
        };

        self.running = false;
        ui.update_status_label(self.status_label());
        outcome
    }

    fn terminate(&self, child: &mut dyn ManagedChild, ui: &dyn UiCallbacks) -> StopOutcome {
        let pid = child.id();
        info!("Sending SIGINT to camera process {}", pid);

        let waited = child
            .interrupt()
            .and_then(|()| child.wait_timeout(self.timeouts.grace));

        match waited {
            Ok(Some(status)) => {
                info!("Camera process {} stopped ({})", pid, status);
                StopOutcome::Graceful
            }
            Ok(None) => {
                let fault = Fault::StopTimeout;
                warn!(
                    "Camera process {} ignored SIGINT for {:?}, killing",
                    pid, self.timeouts.grace
                );
                ui.alert(fault.title(), &fault.to_string());
                self.force_kill(child);
                StopOutcome::KilledAfterTimeout
            }
            Err(e) => {
                let fault = Fault::StopError(e);
                error!("Error stopping camera process {}: {}", pid, fault);
                ui.alert(fault.title(), &fault.to_string());
                self.force_kill(child);
                StopOutcome::KilledAfterError
            }
        }
    }

    fn force_kill(&self, child: &mut dyn ManagedChild) {
        let pid = child.id();
        if let Err(e) = child.kill() {
            warn!("Failed to kill camera process {}: {}", pid, e);
        }

        match child.wait_timeout(self.timeouts.kill_wait) {
            Ok(Some(status)) => debug!("Camera process {} killed ({})", pid, status),
            Ok(None) => warn!(
                "Camera process {} still alive {:?} after SIGKILL",
                pid, self.timeouts.kill_wait
            ),
            Err(e) => warn!("Failed to reap camera process {}: {}", pid, e),
        }
    }

    /// Detect a camera process that exited on its own
    ///
    /// Returns `true` when the process was found dead; the supervisor is then
    /// reset to not running. There is no automatic restart.
    pub fn reap(&mut self, ui: &dyn UiCallbacks) -> bool {
        if !self.running {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                let fault = Fault::ProcessExited { status };
                warn!("Camera process {} exited on its own ({})", child.id(), status);
                ui.alert(fault.title(), &fault.to_string());
                self.child = None;
                self.running = false;
                ui.update_status_label(self.status_label());
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to poll camera process {}: {}", child.id(), e);
                false
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(
                "Supervisor dropped with camera process {} still running, killing",
                child.id()
            );
            let _ = child.kill();
            let _ = child.wait_timeout(self.timeouts.kill_wait);
        }
    }
}
