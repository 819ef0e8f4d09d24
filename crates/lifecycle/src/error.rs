//! Fault taxonomy of the lifecycle engine
//!
//! None of these ever reach a caller of the controller. Each is logged where it
//! is detected and rendered as exactly one UI alert.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Fault {
    #[error("Failed to start USB device monitoring: {0}")]
    MonitorInit(String),

    #[error("{} not found at {}", launcher_name(.path), .path.display())]
    LaunchTargetMissing { path: PathBuf },

    #[error("{0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Forcing termination.")]
    StopTimeout,

    #[error("{0}")]
    StopError(#[source] std::io::Error),

    #[error("Resetting. Camera might still be running if started externally.")]
    StateInconsistent,

    #[error("The camera process exited unexpectedly ({status}).")]
    ProcessExited { status: ExitStatus },
}

impl Fault {
    /// Alert title for this fault
    pub fn title(&self) -> &'static str {
        match self {
            Fault::MonitorInit(_) => "USB Monitor Error",
            Fault::LaunchTargetMissing { .. } => "Error",
            Fault::SpawnFailed(_) => "Error Starting Camera",
            Fault::StopTimeout => "Stopping camera timed out.",
            Fault::StopError(_) => "Error Stopping Camera",
            Fault::StateInconsistent => "Camera State Inconsistent",
            Fault::ProcessExited { .. } => "Camera Process Exited",
        }
    }
}

fn launcher_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Camera launch script".to_string())
}
