//! Agent configuration management

use anyhow::{Context, Result, anyhow};
use common::TargetFilter;
use lifecycle::{LaunchTarget, StopTimeouts};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the stop grace period and the post-kill wait
pub const MAX_STOP_WAIT_SECS: u64 = 3600;

/// Default launch script name, looked up next to the installed executable
pub const DEFAULT_LAUNCHER: &str = "uvc_handler.py";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "AgentSettings::default_log_level")]
    pub log_level: String,
    /// Run headless (systemd) instead of the terminal UI
    #[serde(default)]
    pub service_mode: bool,
    /// Log file used in TUI mode, where stdout belongs to the renderer
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            service_mode: false,
            log_file: None,
        }
    }
}

impl AgentSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Log file path with `~` expanded, falling back to the data directory
    pub fn log_file_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => expand_path(path),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("uvc-autoctl").join("agent.log"))
                .unwrap_or_else(|| PathBuf::from("/tmp/uvc-autoctl/agent.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Target device as `0xVID:0xPID`
    #[serde(default = "DeviceSettings::default_filter")]
    pub filter: String,
    /// Device name used in notifications
    #[serde(default = "DeviceSettings::default_label")]
    pub label: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            filter: Self::default_filter(),
            label: Self::default_label(),
        }
    }
}

impl DeviceSettings {
    fn default_filter() -> String {
        // OAK-D Lite in UVC mode
        "0x03e7:0x2485".to_string()
    }

    fn default_label() -> String {
        lifecycle::DEFAULT_DEVICE_LABEL.to_string()
    }

    pub fn target_filter(&self) -> Result<TargetFilter> {
        self.filter
            .parse()
            .with_context(|| format!("Invalid device filter '{}'", self.filter))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Camera pipeline script; defaults to `uvc_handler.py` next to the executable
    #[serde(default)]
    pub launcher: Option<PathBuf>,
    /// Interpreter the launcher is run with (empty string runs it directly)
    #[serde(default = "CameraSettings::default_interpreter")]
    pub interpreter: String,
    #[serde(default = "CameraSettings::default_args")]
    pub args: Vec<String>,
    /// Initial auto-mode setting
    #[serde(default = "CameraSettings::default_auto_mode")]
    pub auto_mode: bool,
    #[serde(default = "CameraSettings::default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "CameraSettings::default_kill_wait_secs")]
    pub kill_wait_secs: u64,
    /// How often to check whether the camera process died on its own
    #[serde(default = "CameraSettings::default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            launcher: None,
            interpreter: Self::default_interpreter(),
            args: Self::default_args(),
            auto_mode: Self::default_auto_mode(),
            stop_grace_secs: Self::default_stop_grace_secs(),
            kill_wait_secs: Self::default_kill_wait_secs(),
            reap_interval_ms: Self::default_reap_interval_ms(),
        }
    }
}

impl CameraSettings {
    fn default_interpreter() -> String {
        "python3".to_string()
    }

    fn default_args() -> Vec<String> {
        vec![lifecycle::START_STREAMING_FLAG.to_string()]
    }

    fn default_auto_mode() -> bool {
        true
    }

    fn default_stop_grace_secs() -> u64 {
        10
    }

    fn default_kill_wait_secs() -> u64 {
        5
    }

    fn default_reap_interval_ms() -> u64 {
        1000
    }

    /// Launcher path with `~` expanded
    pub fn launcher_path(&self) -> PathBuf {
        match &self.launcher {
            Some(path) => expand_path(path),
            None => std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_LAUNCHER)))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LAUNCHER)),
        }
    }

    pub fn launch_target(&self) -> LaunchTarget {
        let target = LaunchTarget::new(self.launcher_path()).with_args(self.args.iter());
        if self.interpreter.is_empty() {
            target
        } else {
            target.with_interpreter(&self.interpreter)
        }
    }

    pub fn stop_timeouts(&self) -> StopTimeouts {
        StopTimeouts {
            grace: Duration::from_secs(self.stop_grace_secs),
            kill_wait: Duration::from_secs(self.kill_wait_secs),
        }
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

impl AgentConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/uvc-autoctl/agent.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("uvc-autoctl").join("agent.toml")
        } else {
            PathBuf::from(".config/uvc-autoctl/agent.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Self::validate_log_level(&self.agent.log_level)?;

        self.device.target_filter()?;

        if self.device.label.trim().is_empty() {
            return Err(anyhow!("Device label must not be empty"));
        }

        if self.camera.stop_grace_secs == 0 {
            return Err(anyhow!("stop_grace_secs must be greater than 0"));
        }

        if self.camera.stop_grace_secs > MAX_STOP_WAIT_SECS {
            return Err(anyhow!(
                "stop_grace_secs must be at most {}",
                MAX_STOP_WAIT_SECS
            ));
        }

        if self.camera.kill_wait_secs > MAX_STOP_WAIT_SECS {
            return Err(anyhow!(
                "kill_wait_secs must be at most {}",
                MAX_STOP_WAIT_SECS
            ));
        }

        if self.camera.reap_interval_ms == 0 {
            return Err(anyhow!("reap_interval_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Validate a log level name
    pub fn validate_log_level(level: &str) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}
