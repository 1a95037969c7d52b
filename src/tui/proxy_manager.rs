//! TUI for managing the proxy list, testing and connecting

use crate::error::ProbeError;
use crate::proxy::{ProbeResult, ProxyChecker, ProxyRecord, Registry};
use crate::tunnel::{Connection, TunnelPlatform};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Instant;
use tokio::sync::{oneshot, watch};
use tokio::time::Duration;

const FIELD_LABELS: [&str; 3] = ["Address", "Port", "Type"];
const DEFAULT_KIND: &str = "http";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Adding,
}

/// Modal message shown over the list until a key is pressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub body: String,
}

impl Message {
    fn new(title: &str, body: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            body: body.into(),
        }
    }
}

/// Input form for a new proxy
#[derive(Debug, Clone)]
struct AddForm {
    fields: [String; 3],
    focus: usize,
}

impl Default for AddForm {
    fn default() -> Self {
        Self {
            fields: [String::new(), String::new(), DEFAULT_KIND.to_string()],
            focus: 0,
        }
    }
}

/// Proxy manager TUI application state
pub struct ProxyManagerApp<P: TunnelPlatform> {
    registry: Registry,
    /// Registry snapshots; the list is re-rendered when a new one arrives
    snapshot: watch::Receiver<Vec<ProxyRecord>>,
    items: Vec<String>,
    checker: ProxyChecker,
    /// Address under test and the channel its result arrives on
    pending_check: Option<(String, oneshot::Receiver<ProbeResult>)>,
    connection: Connection<P>,
    list_state: ListState,
    mode: Mode,
    form: AddForm,
    status_message: String,
    message: Option<Message>,
    should_quit: bool,
}

impl<P: TunnelPlatform> ProxyManagerApp<P> {
    /// Create a new proxy manager TUI application
    pub fn new(registry: Registry, checker: ProxyChecker, connection: Connection<P>) -> Self {
        let mut snapshot = registry.subscribe();
        let items = render_items(&snapshot.borrow_and_update());
        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(0));
        }

        Self {
            registry,
            snapshot,
            items,
            checker,
            pending_check: None,
            connection,
            list_state,
            mode: Mode::Browse,
            form: AddForm::default(),
            status_message: "a: add  d: delete  t: test  c: connect  x: disconnect  q: quit"
                .to_string(),
            message: None,
            should_quit: false,
        }
    }

    /// Run the TUI application
    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            self.refresh_items();
            terminal.draw(|f| self.ui(f))?;

            // Handle key events with a short timeout
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            self.poll_check();
            if self.connection.poll(Instant::now()) {
                self.message = Some(Message::new(
                    "Connected",
                    "All traffic is now routed through the proxy",
                ));
            }

            // Let the spawned check make progress on a single-threaded runtime
            tokio::task::yield_now().await;
        }

        if self.connection.status().proxy().is_some() {
            self.connection.disconnect();
        }
        Ok(())
    }

    /// Rebuild list lines if the registry published a new snapshot
    fn refresh_items(&mut self) {
        if !self.snapshot.has_changed().unwrap_or(false) {
            return;
        }
        self.items = render_items(&self.snapshot.borrow_and_update());

        let selected = match (self.list_state.selected(), self.items.len()) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => Some(0),
        };
        self.list_state.select(selected);
    }

    /// Deliver a finished check result, if any
    fn poll_check(&mut self) {
        let Some((address, rx)) = self.pending_check.as_mut() else {
            return;
        };

        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(ProbeError::Transport("check was aborted".to_string()))
            }
        };

        self.message = Some(match outcome {
            Ok(success) => Message::new(
                "Success",
                format!(
                    "Proxy connection successful! (HTTP {}, {}ms)",
                    success.status, success.response_time_ms
                ),
            ),
            Err(e) => Message::new("Error", format!("Proxy connection failed: {}", e)),
        });
        self.status_message = format!("Tested {}", address);
        self.pending_check = None;
    }

    fn handle_input(&mut self, key: KeyCode) {
        if self.message.is_some() {
            self.message = None;
            return;
        }

        match self.mode {
            Mode::Browse => self.handle_browse_input(key),
            Mode::Adding => self.handle_form_input(key),
        }
    }

    fn handle_browse_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('a') => {
                self.mode = Mode::Adding;
            }
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('t') => self.test_selected(),
            KeyCode::Char('c') => self.connect_selected(),
            KeyCode::Char('x') => {
                self.connection.disconnect();
            }
            KeyCode::Down => {
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i >= self.items.len().saturating_sub(1) {
                            0
                        } else {
                            i + 1
                        }
                    }
                    None => 0,
                };
                if !self.items.is_empty() {
                    self.list_state.select(Some(i));
                }
            }
            KeyCode::Up => {
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i == 0 {
                            self.items.len().saturating_sub(1)
                        } else {
                            i - 1
                        }
                    }
                    None => 0,
                };
                if !self.items.is_empty() {
                    self.list_state.select(Some(i));
                }
            }
            _ => {}
        }
    }

    fn handle_form_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.mode = Mode::Browse;
            }
            KeyCode::Tab | KeyCode::Down => {
                self.form.focus = (self.form.focus + 1) % FIELD_LABELS.len();
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.form.focus = (self.form.focus + FIELD_LABELS.len() - 1) % FIELD_LABELS.len();
            }
            KeyCode::Backspace => {
                self.form.fields[self.form.focus].pop();
            }
            KeyCode::Char(c) => {
                self.form.fields[self.form.focus].push(c);
            }
            KeyCode::Enter => self.submit_form(),
            _ => {}
        }
    }

    fn submit_form(&mut self) {
        let [address, port, kind] = &self.form.fields;
        match self.registry.add(address, port, kind) {
            Ok(()) => {
                self.status_message = format!("Added {}", address.trim());
                self.finish_form();
            }
            Err(e) if e.is_validation() => {
                self.message = Some(Message::new("Error", e.to_string()));
            }
            Err(e) => {
                self.finish_form();
                self.message = Some(Message::new("Error", e.to_string()));
            }
        }
        self.refresh_items();
    }

    fn finish_form(&mut self) {
        self.form.fields[0].clear();
        self.form.fields[1].clear();
        self.form.focus = 0;
        self.mode = Mode::Browse;
    }

    fn selected_proxy(&mut self) -> Option<ProxyRecord> {
        let proxy = self
            .list_state
            .selected()
            .and_then(|i| self.registry.get(i))
            .cloned();
        if proxy.is_none() {
            self.message = Some(Message::new("Error", "No proxy selected"));
        }
        proxy
    }

    fn delete_selected(&mut self) {
        match self.registry.delete(self.list_state.selected()) {
            Ok(removed) => {
                self.status_message = format!("Deleted {}", removed.endpoint());
            }
            Err(e) => {
                self.message = Some(Message::new("Error", e.to_string()));
            }
        }
        self.refresh_items();
    }

    fn test_selected(&mut self) {
        if self.pending_check.is_some() || self.checker.is_busy() {
            self.status_message = "A test is already running".to_string();
            return;
        }
        let Some(proxy) = self.selected_proxy() else {
            return;
        };

        self.status_message = format!("Testing {}...", proxy.address);
        let address = proxy.address.clone();
        let rx = self.checker.spawn_check(proxy);
        self.pending_check = Some((address, rx));
    }

    fn connect_selected(&mut self) {
        let Some(proxy) = self.selected_proxy() else {
            return;
        };

        if let Err(e) = self.connection.connect(&proxy, Instant::now()) {
            self.message = Some(Message::new("VPN Permission", e.to_string()));
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let form_height = if self.mode == Mode::Adding { 5 } else { 0 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),           // Title
                Constraint::Min(0),              // Proxy list
                Constraint::Length(form_height), // Add form
                Constraint::Length(4),           // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Manager")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let items: Vec<ListItem> = self
            .items
            .iter()
            .map(|line| ListItem::new(line.as_str()))
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Proxies ({})", self.items.len())),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, chunks[1], &mut self.list_state);

        if self.mode == Mode::Adding {
            self.render_form(f, chunks[2]);
        }

        let connection_style = if self.connection.status().is_connected() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Yellow)
        };
        let status = Paragraph::new(vec![
            Line::from(Span::styled(
                self.connection.status().to_string(),
                connection_style,
            )),
            Line::from(self.status_message.as_str()),
        ])
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);

        if let Some(message) = &self.message {
            let area = centered_rect(60, 30, f.size());
            let color = if message.title == "Error" {
                Color::Red
            } else {
                Color::Green
            };
            let popup = Paragraph::new(vec![
                Line::from(message.body.as_str()),
                Line::from(""),
                Line::from(Span::styled(
                    "Press any key",
                    Style::default().fg(Color::DarkGray),
                )),
            ])
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(message.title.as_str())
                    .border_style(Style::default().fg(color)),
            );
            f.render_widget(Clear, area);
            f.render_widget(popup, area);
        }
    }

    fn render_form(&self, f: &mut Frame, area: Rect) {
        let fields = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(50),
                Constraint::Percentage(25),
                Constraint::Percentage(25),
            ])
            .split(area);

        for (i, label) in FIELD_LABELS.iter().enumerate() {
            let border_style = if self.form.focus == i {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let input = Paragraph::new(self.form.fields[i].as_str()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(*label)
                    .border_style(border_style),
            );
            f.render_widget(input, fields[i]);
        }
    }
}

fn render_items(proxies: &[ProxyRecord]) -> Vec<String> {
    proxies.iter().map(ProxyRecord::display_line).collect()
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::CheckerConfig;
    use crate::tunnel::SimulatedTunnel;
    use tempfile::TempDir;

    fn app() -> (TempDir, ProxyManagerApp<SimulatedTunnel>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(dir.path().join("proxies.json")).unwrap();
        let checker = ProxyChecker::with_config(
            CheckerConfig::new().with_timeout(Duration::from_millis(500)),
        );
        let connection = Connection::new(SimulatedTunnel::new(), Duration::ZERO);
        (dir, ProxyManagerApp::new(registry, checker, connection))
    }

    fn type_text(app: &mut ProxyManagerApp<SimulatedTunnel>, text: &str) {
        for c in text.chars() {
            app.handle_input(KeyCode::Char(c));
        }
    }

    fn add_via_form(app: &mut ProxyManagerApp<SimulatedTunnel>, address: &str, port: &str) {
        app.handle_input(KeyCode::Char('a'));
        type_text(app, address);
        app.handle_input(KeyCode::Tab);
        type_text(app, port);
        app.handle_input(KeyCode::Enter);
    }

    #[test]
    fn test_add_through_form() {
        let (_dir, mut app) = app();
        add_via_form(&mut app, "proxy.example.com", "8080");

        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.items, vec!["proxy.example.com:8080 (http)".to_string()]);
        assert_eq!(app.list_state.selected(), Some(0));
        assert!(app.form.fields[0].is_empty());
        assert!(app.form.fields[1].is_empty());
        assert_eq!(app.form.fields[2], "http");
    }

    #[test]
    fn test_invalid_port_keeps_form_open() {
        let (_dir, mut app) = app();
        add_via_form(&mut app, "proxy.example.com", "80x");

        assert_eq!(app.mode, Mode::Adding);
        assert_eq!(
            app.message,
            Some(Message::new("Error", "Port must be a number"))
        );
        assert!(app.items.is_empty());

        // Dismiss, then the form still holds the input
        app.handle_input(KeyCode::Char('z'));
        assert!(app.message.is_none());
        assert_eq!(app.form.fields[1], "80x");
    }

    #[test]
    fn test_delete_selected() {
        let (_dir, mut app) = app();
        add_via_form(&mut app, "a.example", "1");
        add_via_form(&mut app, "b.example", "2");

        app.handle_input(KeyCode::Down);
        app.handle_input(KeyCode::Char('d'));
        assert_eq!(app.items, vec!["a.example:1 (http)".to_string()]);
        assert_eq!(app.list_state.selected(), Some(0));

        app.handle_input(KeyCode::Char('d'));
        assert!(app.items.is_empty());
        assert_eq!(app.list_state.selected(), None);

        app.handle_input(KeyCode::Char('d'));
        assert_eq!(app.message, Some(Message::new("Error", "No proxy selected")));
    }

    #[test]
    fn test_connect_and_disconnect() {
        let (_dir, mut app) = app();
        add_via_form(&mut app, "a.example", "1");

        app.handle_input(KeyCode::Char('c'));
        assert_eq!(app.connection.status().to_string(), "Connecting to a.example...");
        assert!(app.connection.poll(Instant::now()));
        assert_eq!(app.connection.status().to_string(), "Connected to a.example");

        app.handle_input(KeyCode::Char('x'));
        assert_eq!(app.connection.status().to_string(), "Disconnected");
    }

    #[tokio::test]
    async fn test_refused_check_reports_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (_dir, mut app) = app();
        add_via_form(&mut app, "127.0.0.1", &port.to_string());

        app.handle_input(KeyCode::Char('t'));
        assert_eq!(app.status_message, "Testing 127.0.0.1...");

        // Ignored while the first check runs
        app.handle_input(KeyCode::Char('t'));
        assert_eq!(app.status_message, "A test is already running");

        while app.pending_check.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
            app.poll_check();
        }
        let message = app.message.clone().unwrap();
        assert_eq!(message.title, "Error");
        assert!(message.body.starts_with("Proxy connection failed: "));
    }
}
