//! TUI event handling
//!
//! Polls crossterm for terminal events on a background task and turns key
//! presses into [`Action`]s.

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use std::time::Duration;
use tokio::sync::mpsc;

/// Terminal event types
#[derive(Debug, Clone)]
pub enum Event {
    Key(KeyEvent),
    Resize,
    /// Periodic redraw
    Tick,
}

/// User actions derived from keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    /// Flip the auto-mode checkbox
    ToggleAutoMode,
    /// Stop the camera and turn auto mode off
    DisconnectCamera,
    ShowHelp,
    CloseDialog,
    None,
}

impl From<KeyEvent> for Action {
    fn from(key: KeyEvent) -> Self {
        match key.code {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
            KeyCode::Esc | KeyCode::Enter => Action::CloseDialog,

            KeyCode::Char('a') | KeyCode::Char(' ') => Action::ToggleAutoMode,
            KeyCode::Char('d') => Action::DisconnectCamera,
            KeyCode::Char('?') | KeyCode::Char('h') => Action::ShowHelp,

            _ => Action::None,
        }
    }
}

/// Event handler that polls terminal events in a background task
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Spawn the polling task, emitting a [`Event::Tick`] every `tick_rate`
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        // crossterm polling blocks, keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let mut last_tick = std::time::Instant::now();

            loop {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(Duration::ZERO);

                if event::poll(timeout).unwrap_or(false) {
                    let forwarded = match event::read() {
                        Ok(CrosstermEvent::Key(key)) => {
                            // Ignore key release events on some platforms
                            key.kind != event::KeyEventKind::Press
                                || tx.send(Event::Key(key)).is_ok()
                        }
                        Ok(CrosstermEvent::Resize(_, _)) => tx.send(Event::Resize).is_ok(),
                        Ok(_) => true,
                        Err(_) => false,
                    };
                    if !forwarded {
                        break;
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if tx.send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = std::time::Instant::now();
                }
            }
        });

        Self { rx }
    }

    /// Receive the next event; `None` once the poller stopped
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_action_from_key_quit() {
        assert_eq!(Action::from(key(KeyCode::Char('q'))), Action::Quit);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(Action::from(ctrl_c), Action::Quit);
    }

    #[test]
    fn test_action_from_key_camera_controls() {
        assert_eq!(Action::from(key(KeyCode::Char('a'))), Action::ToggleAutoMode);
        assert_eq!(Action::from(key(KeyCode::Char(' '))), Action::ToggleAutoMode);
        assert_eq!(Action::from(key(KeyCode::Char('d'))), Action::DisconnectCamera);
    }

    #[test]
    fn test_action_from_key_dialogs() {
        assert_eq!(Action::from(key(KeyCode::Char('?'))), Action::ShowHelp);
        assert_eq!(Action::from(key(KeyCode::Esc)), Action::CloseDialog);
        assert_eq!(Action::from(key(KeyCode::Enter)), Action::CloseDialog);
    }

    #[test]
    fn test_plain_c_does_nothing() {
        assert_eq!(Action::from(key(KeyCode::Char('c'))), Action::None);
        assert_eq!(Action::from(key(KeyCode::Char('x'))), Action::None);
    }
}
