//! TUI rendering with ratatui

use lifecycle::StatusLabel;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use std::time::Duration;

use super::app::{App, Dialog, LogEntry, LogKind};

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Status bar
            Constraint::Length(7), // Device panel
            Constraint::Min(5),    // Notification log
            Constraint::Length(3), // Help bar
        ])
        .split(frame.area());

    render_status_bar(frame, app, chunks[0]);
    render_device_panel(frame, app, chunks[1]);
    render_log(frame, app, chunks[2]);
    render_help_bar(frame, chunks[3]);

    match app.dialog() {
        Dialog::None => {}
        Dialog::Help => render_help_dialog(frame),
        Dialog::Alert { title, message } => render_alert_dialog(frame, title, message),
    }
}

fn key_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn label_style(label: StatusLabel) -> Style {
    match label {
        StatusLabel::Connected => Style::default().fg(Color::Green),
        StatusLabel::NotConnected => Style::default().fg(Color::Red),
    }
}

/// Checkbox as shown next to the menu item
pub fn checkbox(checked: bool) -> &'static str {
    if checked { "[x]" } else { "[ ]" }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status_text = vec![
        Span::styled("Camera Status: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            app.status_label().to_string(),
            label_style(app.status_label()).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled("Auto Mode ", Style::default().fg(Color::DarkGray)),
        Span::styled(checkbox(app.auto_mode()), Style::default().fg(Color::Cyan)),
        Span::raw("  |  "),
        Span::styled("Uptime: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format_duration(app.uptime()), Style::default().fg(Color::Green)),
    ];

    let status = Paragraph::new(Line::from(status_text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" uvc-autoctl ")
                .title_alignment(Alignment::Center)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(status, area);
}

fn render_device_panel(frame: &mut Frame, app: &App, area: Rect) {
    let field = |name: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("  {:<12}", name), Style::default().fg(Color::DarkGray)),
            Span::raw(value),
        ])
    };

    let lines = match app.tracked_device() {
        Some(device) => vec![
            field("Device", app.device_label().to_string()),
            field(
                "VID:PID",
                format!("{:04x}:{:04x}", device.vendor_id, device.product_id),
            ),
            field("Serial", device.serial_number.clone()),
            field("Service ID", device.service_id.to_string()),
        ],
        None => vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("  Waiting for {} ({})", app.device_label(), app.filter()),
                Style::default().fg(Color::DarkGray),
            )),
        ],
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Device ")
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(panel, area);
}

fn log_item(entry: &LogEntry) -> ListItem<'static> {
    let (marker, style) = match entry.kind {
        LogKind::Notification => ("info ", Style::default().fg(Color::Cyan)),
        LogKind::Alert => ("ALERT", Style::default().fg(Color::Red)),
    };

    let mut spans = vec![
        Span::styled(
            format!("{:>9} ", format_duration(entry.at)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("{} ", marker), style),
        Span::styled(entry.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
    ];
    if !entry.message.is_empty() {
        spans.push(Span::raw(format!(": {}", entry.message)));
    }

    ListItem::new(Line::from(spans))
}

fn render_log(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app.log().map(log_item).collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Notifications ({}) ", app.log_len()))
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(list, area);
}

fn render_help_bar(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        Span::styled("a", key_style()),
        Span::raw(" Auto Mode  "),
        Span::styled("d", key_style()),
        Span::raw(" Disconnect Camera  "),
        Span::styled("?", key_style()),
        Span::raw(" Help  "),
        Span::styled("q", key_style()),
        Span::raw(" Quit"),
    ];

    let help = Paragraph::new(Line::from(help_text))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(help, area);
}

fn render_help_dialog(frame: &mut Frame) {
    let area = centered_rect(60, 50, frame.area());

    let entry = |keys: &'static str, text: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<13}", keys), Style::default().fg(Color::Cyan)),
            Span::raw(text),
        ])
    };

    let help_content = vec![
        Line::from(Span::styled("Camera", key_style())),
        Line::from(""),
        entry("a / Space", "Toggle auto mode (starts or stops the camera)"),
        entry("d", "Disconnect camera and turn auto mode off"),
        Line::from(""),
        Line::from(Span::styled("General", key_style())),
        Line::from(""),
        entry("? / h", "Show this help"),
        entry("Esc / Enter", "Close dialog"),
        entry("q / Ctrl+C", "Quit (stops the camera)"),
    ];

    let help = Paragraph::new(help_content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(help, area);
}

fn render_alert_dialog(frame: &mut Frame, title: &str, message: &str) {
    let area = centered_rect(50, 30, frame.area());

    let content = vec![
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let alert = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", title))
                .border_style(Style::default().fg(Color::Red)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, area);
    frame.render_widget(alert, area);
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::UiEvent;
    use common::test_utils::{OAK_FILTER, oak_identity};
    use ratatui::{Terminal, backend::TestBackend, buffer::Buffer};

    fn buffer_text(buffer: &Buffer) -> String {
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    fn draw(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        buffer_text(terminal.backend().buffer())
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_checkbox() {
        assert_eq!(checkbox(true), "[x]");
        assert_eq!(checkbox(false), "[ ]");
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 50);
        let centered = centered_rect(50, 50, area);

        assert!(centered.x > 0);
        assert!(centered.y > 0);
        assert!(centered.width < 100);
        assert!(centered.height < 50);
    }

    #[test]
    fn test_render_waiting_for_device() {
        let app = App::new("OAK-D Lite", OAK_FILTER);
        let screen = draw(&app);

        assert!(screen.contains("Camera Status: Not Connected"));
        assert!(screen.contains("Waiting for OAK-D Lite (0x03e7:0x2485)"));
    }

    #[test]
    fn test_render_tracked_device_and_log() {
        let mut app = App::new("OAK-D Lite", OAK_FILTER);
        app.set_tracked_device(Some(oak_identity("14442C10D1", 260)));
        app.handle_ui_event(UiEvent::MenuState(true));
        app.handle_ui_event(UiEvent::StatusLabel(StatusLabel::Connected));
        app.handle_ui_event(UiEvent::Notify {
            title: "Camera Connected".into(),
            subtitle: String::new(),
            message: "Camera started automatically.".into(),
        });

        let screen = draw(&app);
        assert!(screen.contains("Camera Status: Connected"));
        assert!(screen.contains("[x]"));
        assert!(screen.contains("14442C10D1"));
        assert!(screen.contains("Camera started automatically."));
    }

    #[test]
    fn test_render_alert_dialog() {
        let mut app = App::new("OAK-D Lite", OAK_FILTER);
        app.handle_ui_event(UiEvent::Alert {
            title: "Camera Process Exited".into(),
            message: "exit status: 1".into(),
        });

        let screen = draw(&app);
        assert!(screen.contains("Camera Process Exited"));
        assert!(screen.contains("Press Enter to dismiss"));
    }
}
