//! UI callback surface
//!
//! The controller reports everything it does through these four hooks. Calls
//! are made while the controller holds its state lock, so they are never
//! concurrent and arrive in the order the state changed.

use std::fmt;

/// Camera status shown to the user, derived from whether the camera runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLabel {
    Connected,
    NotConnected,
}

impl StatusLabel {
    pub fn from_running(running: bool) -> Self {
        if running {
            StatusLabel::Connected
        } else {
            StatusLabel::NotConnected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Connected => "Connected",
            StatusLabel::NotConnected => "Not Connected",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hooks into whatever surface presents the agent to the user
///
/// Implementations must not call back into the controller; the state lock is
/// held for the duration of every call.
pub trait UiCallbacks: Send + Sync {
    /// Transient informational notification
    fn notify(&self, title: &str, subtitle: &str, message: &str);

    /// Error that needs the user's attention
    fn alert(&self, title: &str, message: &str);

    /// Reflect the auto-mode setting in the menu (checkbox state)
    fn update_menu_state(&self, auto_mode_enabled: bool);

    /// Replace the status label
    fn update_status_label(&self, label: StatusLabel);
}

impl<T: UiCallbacks + ?Sized> UiCallbacks for std::sync::Arc<T> {
    fn notify(&self, title: &str, subtitle: &str, message: &str) {
        (**self).notify(title, subtitle, message)
    }

    fn alert(&self, title: &str, message: &str) {
        (**self).alert(title, message)
    }

    fn update_menu_state(&self, auto_mode_enabled: bool) {
        (**self).update_menu_state(auto_mode_enabled)
    }

    fn update_status_label(&self, label: StatusLabel) {
        (**self).update_status_label(label)
    }
}
