//! Systemd service integration
//!
//! Speaks the sd-notify protocol when the agent runs headless under a
//! `Type=notify` unit: readiness, status line, watchdog keepalives.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use tracing::{debug, error, info};

fn send_notification(message: &str) -> Result<bool> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        return Ok(false);
    };
    send_to_socket(&socket_path, message)?;
    Ok(true)
}

fn send_to_socket(socket_path: &str, message: &str) -> Result<()> {
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(message.as_bytes(), socket_path)
        .with_context(|| format!("Failed to send '{}' to systemd", message))?;
    Ok(())
}

/// Notify systemd that the agent finished startup
pub fn notify_ready() -> Result<()> {
    if send_notification("READY=1")? {
        info!("Notified systemd: service ready");
    } else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
    }
    Ok(())
}

/// Notify systemd that the agent began its shutdown sequence
pub fn notify_stopping() -> Result<()> {
    if send_notification("STOPPING=1")? {
        info!("Notified systemd: service stopping");
    } else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
    }
    Ok(())
}

/// Send watchdog keepalive to systemd
pub fn notify_watchdog() -> Result<()> {
    if send_notification("WATCHDOG=1")? {
        debug!("Notified systemd: watchdog keepalive");
    }
    Ok(())
}

/// Publish a status line, visible in `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    if send_notification(&format!("STATUS={}", status))? {
        debug!("Notified systemd: status = {}", status);
    }
    Ok(())
}

/// Watchdog timeout configured by systemd, in microseconds
pub fn get_watchdog_timeout() -> Option<u64> {
    env::var("WATCHDOG_USEC").ok().and_then(|s| s.parse().ok())
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Spawn a task sending WATCHDOG=1 at half the configured interval
///
/// Returns `None` when the unit has no watchdog.
pub fn spawn_watchdog_task() -> Option<tokio::task::JoinHandle<()>> {
    let timeout_usec = get_watchdog_timeout()?;
    let interval_secs = (timeout_usec / 1_000_000) / 2;
    let interval = std::time::Duration::from_secs(interval_secs.max(1));

    info!(
        "Systemd watchdog enabled, interval: {}s (timeout: {}s)",
        interval.as_secs(),
        timeout_usec / 1_000_000
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = notify_watchdog() {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-wide; keep every env-touching assertion
    // in one test so they cannot interleave.
    #[test]
    fn test_without_systemd_environment() {
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
            env::remove_var("WATCHDOG_USEC");
        }

        assert!(!is_systemd());
        assert!(notify_ready().is_ok());
        assert!(notify_stopping().is_ok());
        assert!(notify_watchdog().is_ok());
        assert!(notify_status("Camera Status: Not Connected").is_ok());
        assert!(get_watchdog_timeout().is_none());

        unsafe {
            env::set_var("WATCHDOG_USEC", "30000000");
        }
        assert_eq!(get_watchdog_timeout(), Some(30_000_000));

        unsafe {
            env::set_var("WATCHDOG_USEC", "invalid");
        }
        assert!(get_watchdog_timeout().is_none());

        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
    }

    #[test]
    fn test_send_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        assert!(send_to_socket(path.to_str().unwrap(), "READY=1").is_err());
    }

    #[test]
    fn test_notification_reaches_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let listener = UnixDatagram::bind(&path).unwrap();

        send_to_socket(path.to_str().unwrap(), "STATUS=Camera Status: Connected").unwrap();

        let mut buf = [0u8; 64];
        let len = listener.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"STATUS=Camera Status: Connected");
    }
}
