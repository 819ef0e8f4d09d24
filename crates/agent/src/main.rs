//! uvc-autoctl agent
//!
//! Starts the camera pipeline when the target USB camera is plugged in and
//! stops it when the camera goes away, with a user-togglable auto mode.

mod config;
mod service;
mod surface;
mod tui;
mod usb;

use anyhow::{Context, Result};
use clap::Parser;
use common::{TargetFilter, setup_file_logging, setup_logging};
use config::AgentConfig;
use lifecycle::{CommandLauncher, Controller, ProcessSupervisor, UiCallbacks};
use std::sync::Arc;
use std::time::Duration;
use surface::{ChannelUi, LogUi};
use tokio::signal;
use tracing::{error, info, warn};
use usb::RusbMonitor;

#[derive(Parser, Debug)]
#[command(name = "uvc-autoctl")]
#[command(
    author,
    version,
    about = "Start a UVC camera pipeline whenever the camera is plugged in"
)]
#[command(long_about = "
Watches for a USB camera (an OAK-D Lite by default) and runs its UVC
streaming pipeline while it is attached. Auto mode can be switched off to
keep the camera stopped.

EXAMPLES:
    # Run with the terminal UI
    uvc-autoctl

    # Run as systemd service (no TUI)
    uvc-autoctl --service

    # Show attached target devices and exit
    uvc-autoctl --list-devices

    # Run with custom config and debug logging
    uvc-autoctl --config /path/to/agent.toml --log-level debug

CONFIGURATION:
    The agent looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/uvc-autoctl/agent.toml
    3. /etc/uvc-autoctl/agent.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run as systemd service (no TUI)
    #[arg(long)]
    service: bool,

    /// List attached target devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = AgentConfig::default();
        let path = AgentConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        AgentConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        AgentConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.agent.log_level.clone());
    AgentConfig::validate_log_level(&log_level)?;

    let service_mode = args.service || config.agent.service_mode;
    let tui_mode = !service_mode && !args.list_devices;

    if tui_mode {
        let log_file = config.agent.log_file_path();
        setup_file_logging(&log_level, &log_file).context("Failed to setup logging")?;
    } else {
        setup_logging(&log_level).context("Failed to setup logging")?;
    }

    info!("uvc-autoctl v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let filter = config.device.target_filter()?;

    if args.list_devices {
        return list_devices_mode(filter).await;
    }

    if service_mode {
        info!("Running in service mode (headless)");
        run_service(config, filter).await
    } else {
        info!("Running in TUI mode (interactive)");
        run_tui(config, filter).await
    }
}

/// List attached target devices and exit
async fn list_devices_mode(filter: TargetFilter) -> Result<()> {
    info!("Listing devices matching {}...", filter);
    let devices = usb::list_target_devices(filter).await?;

    if devices.is_empty() {
        println!("No device matching {} found.", filter);
    } else {
        println!("Found {} device(s) matching {}:\n", devices.len(), filter);
        for device in devices {
            println!(
                "  {:04x}:{:04x}  Serial: {}  Service ID: {}",
                device.vendor_id, device.product_id, device.serial_number, device.service_id
            );
        }
    }

    Ok(())
}

fn build_controller<U: UiCallbacks>(
    ui: U,
    config: &AgentConfig,
    filter: TargetFilter,
) -> Arc<Controller<U>> {
    let target = config.camera.launch_target();
    info!("Camera launcher: {}", target.script().display());

    let supervisor = ProcessSupervisor::new(Box::new(CommandLauncher), target)
        .with_timeouts(config.camera.stop_timeouts());

    Arc::new(
        Controller::new(ui, filter, supervisor, config.camera.auto_mode)
            .with_device_label(config.device.label.clone()),
    )
}

/// Push the initial UI state and start hotplug monitoring
///
/// A monitor failure is alerted by the controller; the agent keeps running
/// so the camera can still be driven by hand.
async fn start_controller<U: UiCallbacks + 'static>(controller: &Arc<Controller<U>>) -> Result<()> {
    controller.sync_ui();

    let controller = Arc::clone(controller);
    let handle = tokio::task::spawn_blocking(move || {
        controller.start_monitoring(Box::new(RusbMonitor::new()))
    })
    .await
    .context("USB monitor startup task failed")?;

    if handle.is_none() {
        warn!("Running without hotplug events");
    }
    Ok(())
}

/// Periodically look for a camera process that died on its own
fn spawn_reaper<U: UiCallbacks + 'static>(
    controller: &Arc<Controller<U>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let controller = Arc::clone(&controller);
            if tokio::task::spawn_blocking(move || controller.reap_exited())
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

/// Stop monitoring and the camera; may take the whole stop timeout
async fn shutdown_controller<U: UiCallbacks + 'static>(controller: Arc<Controller<U>>) -> Result<()> {
    tokio::task::spawn_blocking(move || controller.shutdown())
        .await
        .context("Controller shutdown task failed")
}

async fn wait_for_shutdown_signal() {
    let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            error!("Cannot listen for SIGTERM: {}", e);
            None
        }
    };

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
            Err(e) => error!("Error waiting for Ctrl+C: {}", e),
        },
        Some(_) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => std::future::pending::<Option<()>>().await,
            }
        } => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

/// Run in service mode (headless, systemd-compatible)
async fn run_service(config: AgentConfig, filter: TargetFilter) -> Result<()> {
    if service::is_systemd() {
        info!("Running under systemd");
    }

    let controller = build_controller(LogUi, &config, filter);
    start_controller(&controller).await?;
    let reaper = spawn_reaper(&controller, config.camera.reap_interval());
    let watchdog = service::spawn_watchdog_task();

    service::notify_ready().context("Failed to notify systemd ready")?;
    info!("Watching for {} ({}), press Ctrl+C to stop", config.device.label, filter);

    wait_for_shutdown_signal().await;

    service::notify_stopping().context("Failed to notify systemd stopping")?;
    reaper.abort();
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    shutdown_controller(controller).await?;
    info!("Agent shutdown complete");
    Ok(())
}

/// Run in TUI mode (interactive terminal UI)
async fn run_tui(config: AgentConfig, filter: TargetFilter) -> Result<()> {
    let (ui, ui_rx) = ChannelUi::new();
    let controller = build_controller(ui, &config, filter);
    start_controller(&controller).await?;
    let reaper = spawn_reaper(&controller, config.camera.reap_interval());

    let tui_result = tui::run(
        Arc::clone(&controller),
        ui_rx,
        config.device.label.clone(),
        filter,
    )
    .await;

    reaper.abort();
    if controller.is_camera_running() {
        println!("Stopping camera...");
    }
    shutdown_controller(controller).await?;

    tui_result
}
