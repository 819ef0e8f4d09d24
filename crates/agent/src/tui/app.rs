//! TUI application state
//!
//! Holds what the controller last reported and runs the event loop. Every
//! controller operation can block for the camera's stop timeout, so keyboard
//! commands are queued to a single blocking worker that applies them in the
//! order they were typed. Their outcome arrives back as [`UiEvent`]s.

use anyhow::Result;
use common::{DeviceIdentity, TargetFilter};
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use lifecycle::{Controller, StatusLabel, UiCallbacks};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use super::events::{Action, Event, EventHandler};
use super::ui;
use crate::surface::{ChannelUi, UiEvent};

/// Entries kept in the notification log
pub const LOG_CAPACITY: usize = 200;

const TICK_RATE: Duration = Duration::from_millis(250);
const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Notification,
    Alert,
}

/// One line of the notification log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Time since the agent started
    pub at: Duration,
    pub kind: LogKind,
    pub title: String,
    pub message: String,
}

/// Current dialog/popup being displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    None,
    Help,
    /// Modal alert, dismissed with Esc/Enter
    Alert { title: String, message: String },
}

/// Controller operation requested from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleAutoMode,
    DisconnectCamera,
}

/// Application state
pub struct App {
    device_label: String,
    filter: TargetFilter,
    status_label: StatusLabel,
    auto_mode: bool,
    tracked: Option<DeviceIdentity>,
    log: VecDeque<LogEntry>,
    dialog: Dialog,
    should_quit: bool,
    start_time: Instant,
}

impl App {
    pub fn new(device_label: impl Into<String>, filter: TargetFilter) -> Self {
        Self {
            device_label: device_label.into(),
            filter,
            status_label: StatusLabel::NotConnected,
            auto_mode: false,
            tracked: None,
            log: VecDeque::new(),
            dialog: Dialog::None,
            should_quit: false,
            start_time: Instant::now(),
        }
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    pub fn filter(&self) -> TargetFilter {
        self.filter
    }

    pub fn status_label(&self) -> StatusLabel {
        self.status_label
    }

    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }

    pub fn tracked_device(&self) -> Option<&DeviceIdentity> {
        self.tracked.as_ref()
    }

    /// Log entries, newest first
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter().rev()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Apply a UI callback captured from the controller
    pub fn handle_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Notify {
                title,
                subtitle,
                message,
            } => {
                let title = if subtitle.is_empty() {
                    title
                } else {
                    format!("{} ({})", title, subtitle)
                };
                self.push_log(LogKind::Notification, title, message);
            }
            UiEvent::Alert { title, message } => {
                self.push_log(LogKind::Alert, title.clone(), message.clone());
                self.dialog = Dialog::Alert { title, message };
            }
            UiEvent::MenuState(enabled) => self.auto_mode = enabled,
            UiEvent::StatusLabel(label) => self.status_label = label,
        }
    }

    pub fn set_tracked_device(&mut self, device: Option<DeviceIdentity>) {
        self.tracked = device;
    }

    fn push_log(&mut self, kind: LogKind, title: String, message: String) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry {
            at: self.uptime(),
            kind,
            title,
            message,
        });
    }

    /// Handle user action, returning the controller operation it asks for
    pub fn handle_action(&mut self, action: Action) -> Option<Command> {
        match action {
            Action::Quit => {
                if self.dialog != Dialog::None {
                    self.dialog = Dialog::None;
                } else {
                    self.should_quit = true;
                }
                None
            }
            Action::CloseDialog => {
                self.dialog = Dialog::None;
                None
            }
            Action::ShowHelp => {
                self.dialog = Dialog::Help;
                None
            }
            Action::ToggleAutoMode if self.dialog == Dialog::None => Some(Command::ToggleAutoMode),
            Action::DisconnectCamera if self.dialog == Dialog::None => {
                Some(Command::DisconnectCamera)
            }
            Action::ToggleAutoMode | Action::DisconnectCamera | Action::None => None,
        }
    }
}

/// Terminal wrapper for setup/teardown
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Enter TUI mode (raw mode, alternate screen)
    pub fn enter(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        self.terminal.clear()?;
        Ok(())
    }

    /// Exit TUI mode (restore terminal state)
    pub fn exit(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    pub fn draw(&mut self, app: &App) -> Result<()> {
        self.terminal.draw(|frame| {
            ui::render(frame, app);
        })?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Start the worker that applies keyboard commands to the controller
///
/// The worker exits once the returned sender is dropped and the queue is
/// drained.
fn spawn_command_worker<U: UiCallbacks + 'static>(
    controller: &Arc<Controller<U>>,
) -> (mpsc::UnboundedSender<Command>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = Arc::clone(controller);

    let handle = tokio::task::spawn_blocking(move || {
        drain_commands(rx, |command| match command {
            Command::ToggleAutoMode => controller.toggle_auto_mode(),
            Command::DisconnectCamera => controller.disconnect_camera_explicitly(),
        })
    });

    (tx, handle)
}

fn drain_commands(mut rx: mpsc::UnboundedReceiver<Command>, mut apply: impl FnMut(Command)) {
    while let Some(command) = rx.blocking_recv() {
        debug!("Applying {:?}", command);
        apply(command);
    }
}

/// Poll the tracked device off the UI loop; the controller lock may be held
/// for a whole stop timeout
fn spawn_device_poller(
    controller: &Arc<Controller<ChannelUi>>,
) -> (watch::Receiver<Option<DeviceIdentity>>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let controller = Arc::clone(controller);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DEVICE_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let controller = Arc::clone(&controller);
            let Ok(device) = tokio::task::spawn_blocking(move || controller.tracked_device()).await
            else {
                break;
            };
            tx.send_if_modified(|current| {
                let changed = *current != device;
                *current = device;
                changed
            });
            if tx.is_closed() {
                break;
            }
        }
    });

    (rx, handle)
}

/// Run the TUI until the user quits
///
/// Shutting the controller down is left to the caller, after the terminal
/// has been restored.
pub async fn run(
    controller: Arc<Controller<ChannelUi>>,
    mut ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    device_label: String,
    filter: TargetFilter,
) -> Result<()> {
    let mut tui = Tui::new()?;
    tui.enter()?;

    let mut app = App::new(device_label, filter);
    let mut events = EventHandler::new(TICK_RATE);
    let (mut device_rx, poller) = spawn_device_poller(&controller);
    // The worker may be inside a stop timeout when we quit; the caller's
    // shutdown waits for it on the controller lock
    let (commands, _command_worker) = spawn_command_worker(&controller);

    loop {
        if let Err(e) = tui.draw(&app) {
            error!("Failed to draw UI: {:#}", e);
            break;
        }

        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Event::Key(key)) => {
                        if let Some(command) = app.handle_action(Action::from(key)) {
                            if commands.send(command).is_err() {
                                error!("Command worker is gone");
                                break;
                            }
                        }
                    }
                    Some(Event::Resize) | Some(Event::Tick) => {}
                    None => break,
                }
            }

            Some(ui_event) = ui_rx.recv() => {
                app.handle_ui_event(ui_event);
                // Apply everything already queued before redrawing
                while let Ok(ui_event) = ui_rx.try_recv() {
                    app.handle_ui_event(ui_event);
                }
            }

            Ok(()) = device_rx.changed() => {
                let device = device_rx.borrow_and_update().clone();
                app.set_tracked_device(device);
            }
        }

        if app.should_quit() {
            break;
        }
    }

    poller.abort();
    drop(commands);
    tui.exit()?;

    Ok(())
}
