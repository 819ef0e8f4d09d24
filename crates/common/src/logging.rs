//! Logging setup and configuration

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn build_filter(default_level: &str) -> crate::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))
}

/// Setup tracing subscriber for the application
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = build_filter(default_level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

/// Setup tracing subscriber writing to a log file instead of stdout
///
/// Used by the terminal UI, where stdout belongs to the renderer.
pub fn setup_file_logging(default_level: &str, path: &Path) -> crate::Result<()> {
    let filter = build_filter(default_level)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_rejects_garbage() {
        // SAFETY: tests in this module do not read RUST_LOG concurrently
        unsafe {
            std::env::remove_var("RUST_LOG");
        }
        assert!(build_filter("info").is_ok());
        assert!(build_filter("usb=notalevel").is_err());
    }
}
