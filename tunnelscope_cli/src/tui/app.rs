//! TUI application state and event handling

use crate::inspector::{InspectSession, MethodFilter};
use crate::transport::{ReadyState, TransportEvent};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tunnelscope_common::{Method, RequestPayload, TunnelConfig};

/// TUI view modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Detail,
}

/// Tabs of the detail pane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailTab {
    Headers,
    Request,
    Response,
}

impl DetailTab {
    pub fn title(&self) -> &'static str {
        match self {
            DetailTab::Headers => "Headers",
            DetailTab::Request => "Request",
            DetailTab::Response => "Response",
        }
    }
}

/// Where key presses go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

/// Events that can be sent to the TUI
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Notification from the inspection stream
    Transport(TransportEvent),
    /// Connection readiness changed
    ReadyState(ReadyState),
    /// Tunnel config fetched
    Config(TunnelConfig),
    /// Key event from terminal
    Key(KeyEvent),
    /// Tick for periodic updates
    Tick,
}

/// Side effects requested by the TUI, performed by the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchConfig,
    Resend(RequestPayload),
    OpenUrl(String),
}

/// TUI application state
pub struct TuiApp {
    pub session: InspectSession,
    pub view: View,
    pub tab: DetailTab,
    pub input: InputMode,
    pub inspect_url: String,
    pub version: String,
    pub notice: Option<String>,
    pub should_quit: bool,
}

impl TuiApp {
    pub fn new(session: InspectSession, inspect_url: String) -> Self {
        Self {
            session,
            view: View::List,
            tab: DetailTab::Headers,
            input: InputMode::Normal,
            inspect_url,
            version: env!("CARGO_PKG_VERSION").to_string(),
            notice: None,
            should_quit: false,
        }
    }

    /// Handle TUI event
    pub fn handle_event(&mut self, event: TuiEvent) -> Option<Command> {
        match event {
            TuiEvent::Transport(event) => match self.session.handle_transport(event) {
                Some(crate::inspector::SessionAction::FetchConfig) => Some(Command::FetchConfig),
                _ => None,
            },
            TuiEvent::ReadyState(state) => {
                self.session.set_ready_state(state);
                None
            }
            TuiEvent::Config(config) => {
                self.session.set_tunnel_config(config);
                None
            }
            TuiEvent::Key(key) => self.handle_key(key),
            TuiEvent::Tick => None, // Just triggers a redraw
        }
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return None;
            }
            (KeyCode::Char('r'), KeyModifiers::CONTROL) => {
                self.session.toggle_regex();
                return None;
            }
            _ => {}
        }

        match self.input {
            InputMode::Search => {
                self.handle_search_key(key);
                None
            }
            InputMode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let mut search = self.session.filter().search.clone();
        match key.code {
            KeyCode::Enter | KeyCode::Esc => {
                self.input = InputMode::Normal;
                return;
            }
            KeyCode::Backspace => {
                search.pop();
            }
            KeyCode::Char(c) => search.push(c),
            _ => return,
        }
        self.session.set_search(search);
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Option<Command> {
        self.notice = None;

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.session.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.session.select_next(),
            KeyCode::Home => self.session.select_first(),
            KeyCode::End => self.session.select_last(),
            KeyCode::Enter => {
                if self.session.selected_index().is_none() {
                    self.session.select_first();
                }
                if self.session.selected_index().is_some() {
                    self.view = View::Detail;
                }
            }
            KeyCode::Esc => {
                if self.view == View::Detail {
                    self.view = View::List;
                } else if !self.session.filter().search.is_empty() {
                    self.session.set_search("");
                } else {
                    self.session.clear_selection();
                }
            }
            KeyCode::Char('/') => self.input = InputMode::Search,
            KeyCode::Char('m') => self.session.cycle_methods(),
            KeyCode::Char('M') => self.session.set_methods(MethodFilter::any()),
            KeyCode::Char('0') => self.session.set_methods(MethodFilter::none()),
            KeyCode::Char(c @ '1'..='9') => {
                let slot = c as usize - '1' as usize;
                if let Some(method) = Method::ALL.get(slot) {
                    self.session.toggle_method(*method);
                }
            }
            KeyCode::Tab => self.next_tab(),
            KeyCode::Char('v') => self.session.toggle_raw_body(),
            KeyCode::Char('c') => {
                self.session.clear();
                self.view = View::List;
                self.tab = DetailTab::Headers;
            }
            KeyCode::Char('r') => {
                let selected = self.session.selected()?;
                self.notice = Some(format!(
                    "Resending {} {}",
                    selected.request.method, selected.request.path
                ));
                return Some(Command::Resend(selected.request));
            }
            KeyCode::Char('o') => {
                return self.session.tunnel_url().map(|url| Command::OpenUrl(url.to_string()));
            }
            _ => {}
        }
        None
    }

    /// Cycle detail tabs, skipping Response while it is pending
    fn next_tab(&mut self) {
        let has_response = self
            .session
            .selected()
            .map(|p| !p.is_pending())
            .unwrap_or(false);

        self.tab = match self.tab {
            DetailTab::Headers => DetailTab::Request,
            DetailTab::Request if has_response => DetailTab::Response,
            DetailTab::Request | DetailTab::Response => DetailTab::Headers,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode) -> TuiEvent {
        TuiEvent::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn app_with_requests() -> TuiApp {
        let mut app = TuiApp::new(InspectSession::default(), "ws://localhost:4040/inspect/".into());
        app.handle_event(TuiEvent::Transport(TransportEvent::Opened { generation: 1 }));
        for (id, method, path) in [("a", "GET", "/one"), ("b", "POST", "/two")] {
            let raw = format!(
                r#"{{"type":"request","payload":{{"id":"{id}","timestamp":"2024-03-01T10:15:30","method":"{method}","path":"{path}","headers":[]}}}}"#
            );
            app.handle_event(TuiEvent::Transport(TransportEvent::Message { generation: 1, raw }));
        }
        app
    }

    #[test]
    fn test_open_triggers_config_fetch() {
        let mut app = TuiApp::new(InspectSession::default(), String::new());
        assert_eq!(
            app.handle_event(TuiEvent::Transport(TransportEvent::Opened { generation: 1 })),
            Some(Command::FetchConfig)
        );
    }

    #[test]
    fn test_enter_opens_newest_and_resend() {
        let mut app = app_with_requests();
        app.handle_event(key(KeyCode::Enter));
        assert_eq!(app.view, View::Detail);
        assert_eq!(app.session.selected_index(), Some(1));

        match app.handle_event(key(KeyCode::Char('r'))) {
            Some(Command::Resend(request)) => assert_eq!(request.path, "/two"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_search_mode_edits_filter() {
        let mut app = app_with_requests();
        app.handle_event(key(KeyCode::Char('/')));
        for c in "ONE".chars() {
            app.handle_event(key(KeyCode::Char(c)));
        }
        // 'q' is text while searching, not quit
        app.handle_event(key(KeyCode::Char('q')));
        app.handle_event(key(KeyCode::Backspace));
        app.handle_event(key(KeyCode::Enter));

        assert!(!app.should_quit);
        assert_eq!(app.session.filter().search, "ONE");
        assert_eq!(app.session.snapshot().visible, vec![0]);
    }

    #[test]
    fn test_clear_key_resets_everything() {
        let mut app = app_with_requests();
        app.handle_event(key(KeyCode::Enter));
        app.handle_event(key(KeyCode::Char('c')));

        assert_eq!(app.view, View::List);
        assert_eq!(app.session.selected_index(), None);
        assert!(app.session.snapshot().pairs.is_empty());
    }

    #[test]
    fn test_tab_skips_pending_response() {
        let mut app = app_with_requests();
        app.handle_event(key(KeyCode::Enter));
        app.handle_event(key(KeyCode::Tab));
        assert_eq!(app.tab, DetailTab::Request);
        app.handle_event(key(KeyCode::Tab));
        assert_eq!(app.tab, DetailTab::Headers);
    }

    #[test]
    fn test_open_url_needs_config() {
        let mut app = app_with_requests();
        assert_eq!(app.handle_event(key(KeyCode::Char('o'))), None);

        app.handle_event(TuiEvent::Config(TunnelConfig {
            url: "https://demo.example.com".to_string(),
        }));
        assert_eq!(
            app.handle_event(key(KeyCode::Char('o'))),
            Some(Command::OpenUrl("https://demo.example.com".to_string()))
        );
    }

    #[test]
    fn test_digit_keys_build_a_method_set() {
        let mut app = app_with_requests();
        app.handle_event(key(KeyCode::Char('0')));
        assert!(app.session.snapshot().visible.is_empty());

        // Method::ALL order: GET HEAD POST ...
        app.handle_event(key(KeyCode::Char('3')));
        assert_eq!(app.session.snapshot().visible, vec![1]);
        app.handle_event(key(KeyCode::Char('1')));
        assert_eq!(app.session.filter().methods.label(), "CUSTOM");
        assert_eq!(app.session.snapshot().visible, vec![1, 0]);

        app.handle_event(key(KeyCode::Char('M')));
        assert!(app.session.filter().methods.is_any());
    }
}
