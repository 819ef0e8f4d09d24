//! User-facing surfaces for the controller's UI callbacks
//!
//! Headless mode writes everything to the log and mirrors the status label to
//! systemd. The terminal UI receives the same calls as [`UiEvent`]s over a
//! channel, since callbacks run under the controller's lock and must return
//! immediately.

use crate::service;
use lifecycle::{StatusLabel, UiCallbacks};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{error, info, warn};

/// One UI callback, captured for delivery to the terminal UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
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

/// Status line published to systemd
pub fn status_line(label: StatusLabel) -> String {
    format!("Camera Status: {}", label)
}

/// Headless surface: logs notifications and alerts
pub struct LogUi;

impl UiCallbacks for LogUi {
    fn notify(&self, title: &str, subtitle: &str, message: &str) {
        info!(%subtitle, "{}: {}", title, message);
    }

    fn alert(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
    }

    fn update_menu_state(&self, auto_mode_enabled: bool) {
        info!(
            "Auto mode {}",
            if auto_mode_enabled { "enabled" } else { "disabled" }
        );
    }

    fn update_status_label(&self, label: StatusLabel) {
        if let Err(e) = service::notify_status(&status_line(label)) {
            warn!("Failed to send status to systemd: {:#}", e);
        }
    }
}

/// Terminal UI surface: forwards every callback over a channel
pub struct ChannelUi {
    tx: UnboundedSender<UiEvent>,
}

impl ChannelUi {
    pub fn new() -> (Self, UnboundedReceiver<UiEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: UiEvent) {
        // Receiver is gone only while the TUI is tearing down
        if self.tx.send(event).is_err() {
            tracing::debug!("UI channel closed, dropping event");
        }
    }
}

impl UiCallbacks for ChannelUi {
    fn notify(&self, title: &str, subtitle: &str, message: &str) {
        info!("{}: {}", title, message);
        self.forward(UiEvent::Notify {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            message: message.to_string(),
        });
    }

    fn alert(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
        self.forward(UiEvent::Alert {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn update_menu_state(&self, auto_mode_enabled: bool) {
        self.forward(UiEvent::MenuState(auto_mode_enabled));
    }

    fn update_status_label(&self, label: StatusLabel) {
        self.forward(UiEvent::StatusLabel(label));
    }
}
