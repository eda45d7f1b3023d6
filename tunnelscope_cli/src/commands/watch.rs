//! Watch command - attach to an inspection server and show its traffic

use crate::config::{Config, Endpoints};
use crate::inspector::body::format_timing;
use crate::inspector::{InspectClient, InspectSession, MethodFilter, RequestStore, SessionAction, ViewFilter};
use crate::transport::{self, ConnectionHandle, ReadyState, ReconnectPolicy, TransportEvent};
use crate::tui::{self, Command, TuiApp, TuiEvent};
use anyhow::{Context, Result};
use console::style;
use crossterm::{
    event::{self, Event as TermEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tunnelscope_common::{Event, Method, TunnelConfig};

/// Options for the watch command
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Inspection server address, overrides the config file
    pub addr: Option<String>,
    /// Print lines instead of running the TUI
    pub plain: bool,
    /// Treat the search text as a regular expression
    pub regex: bool,
    /// Initial method filter, empty means any
    pub methods: Vec<Method>,
    /// Initial search text
    pub search: Option<String>,
    /// Pause between failed connect attempts
    pub retry_delay_ms: Option<u64>,
}

impl WatchOptions {
    fn view_filter(&self, config: &Config) -> ViewFilter {
        ViewFilter {
            methods: if self.methods.is_empty() {
                MethodFilter::any()
            } else {
                MethodFilter::from_methods(self.methods.iter().copied())
            },
            search: self.search.clone().unwrap_or_default(),
            regex: self.regex || config.regex_search,
        }
    }

    fn reconnect_policy(&self, config: &Config) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.retry_delay()),
        }
    }
}

/// Run the watch command
pub async fn run(opts: WatchOptions) -> Result<()> {
    let config = Config::load()?;
    let addr = opts.addr.clone().unwrap_or_else(|| config.inspect_addr.clone());
    let endpoints = Endpoints::parse(&addr)?;
    let client = InspectClient::new(endpoints.http_base.clone())?;
    let session = InspectSession::new(opts.view_filter(&config));

    tracing::info!("Watching {}", endpoints.ws_url);
    let (handle, events) = transport::connect(endpoints.ws_url.clone(), opts.reconnect_policy(&config));

    let result = if opts.plain {
        run_plain(&endpoints, client, session, &handle, events).await
    } else {
        run_tui(&endpoints, client, session, &handle, events).await
    };

    handle.shutdown().await;
    result
}

/// Fetch the tunnel config in the background, reporting back through `tx`
fn spawn_config_fetch(client: &InspectClient, tx: &mpsc::Sender<TunnelConfig>) {
    let client = client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        match client.fetch_config().await {
            Ok(config) => {
                let _ = tx.send(config).await;
            }
            Err(e) => tracing::warn!("Could not fetch tunnel config: {:#}", e),
        }
    });
}

async fn run_tui(
    endpoints: &Endpoints,
    client: InspectClient,
    session: InspectSession,
    handle: &ConnectionHandle,
    events: mpsc::Receiver<TransportEvent>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = TuiApp::new(session, endpoints.ws_url.clone());

    let result = run_tui_loop(&mut terminal, &mut app, client, handle, events).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    client: InspectClient,
    handle: &ConnectionHandle,
    mut events: mpsc::Receiver<TransportEvent>,
) -> Result<()> {
    let mut state_rx = handle.subscribe();
    let (config_tx, mut config_rx) = mpsc::channel::<TunnelConfig>(4);
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        // Draw UI
        terminal.draw(|f| tui::draw(f, app))?;

        let mut commands = Vec::new();
        tokio::select! {
            // Handle keyboard events (non-blocking)
            _ = tick_interval.tick() => {
                while event::poll(Duration::from_millis(0))? {
                    if let TermEvent::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        commands.extend(app.handle_event(TuiEvent::Key(key)));
                        if app.should_quit {
                            return Ok(());
                        }
                    }
                }
            }

            Some(update) = events.recv() => commands.extend(app.handle_event(TuiEvent::Transport(update))),

            Ok(()) = state_rx.changed() => {
                app.handle_event(TuiEvent::ReadyState(handle.ready_state()));
            }

            Some(config) = config_rx.recv() => {
                app.handle_event(TuiEvent::Config(config));
            }
        }

        for command in commands {
            match command {
                Command::FetchConfig => spawn_config_fetch(&client, &config_tx),
                Command::Resend(request) => {
                    let client = client.clone();
                    tokio::spawn(async move {
                        if let Err(e) = client.resend(&request).await {
                            tracing::warn!("Resend of {} {} failed: {:#}", request.method, request.path, e);
                        }
                    });
                }
                Command::OpenUrl(url) => {
                    if let Err(e) = open::that(&url) {
                        tracing::warn!("Could not open {}: {}", url, e);
                        app.notice = Some(format!("Could not open {}", url));
                    }
                }
            }
        }
    }
}

async fn run_plain(
    endpoints: &Endpoints,
    client: InspectClient,
    mut session: InspectSession,
    handle: &ConnectionHandle,
    mut events: mpsc::Receiver<TransportEvent>,
) -> Result<()> {
    use cliclack::{intro, log, note, outro};

    intro(style(" tunnelscope ").on_cyan().black().to_string())?;
    note(
        "Inspecting",
        format!(
            "Stream:  {}\nHTTP:    {}",
            style(&endpoints.ws_url).cyan(),
            style(client.base_url()).dim()
        ),
    )?;

    let mut state_rx = handle.subscribe();
    let (config_tx, mut config_rx) = mpsc::channel::<TunnelConfig>(4);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,

            Ok(()) = state_rx.changed() => {
                let state = handle.ready_state();
                session.set_ready_state(state);
                match state {
                    ReadyState::Open => log::success(format!("Connection {}", style(state.as_str()).green()))?,
                    ReadyState::Closed => log::warning(format!("Connection {}", style(state.as_str()).red()))?,
                    ReadyState::Connecting | ReadyState::Closing => {
                        log::step(format!("Connection {}", style(state.as_str()).yellow()))?
                    }
                }
            }

            Some(update) = events.recv() => match session.handle_transport(update) {
                Some(SessionAction::FetchConfig) => spawn_config_fetch(&client, &config_tx),
                Some(SessionAction::Applied(event)) => {
                    if let Some(line) = describe_event(session.store(), &event) {
                        println!("{}", line);
                    }
                }
                None => {}
            },

            Some(config) = config_rx.recv() => {
                log::info(format!("Forwarding {}", style(&config.url).green()))?;
                session.set_tunnel_config(config);
            }
        }
    }

    let summary = session.summary();
    outro(format!(
        "Saw {} requests, {} errors",
        summary.total_requests, summary.errors
    ))?;
    Ok(())
}

/// One output line for an applied event in plain mode
fn describe_event(store: &RequestStore, event: &Event) -> Option<String> {
    match event {
        Event::Request(request) => Some(format!("→ {:<7} {}", request.method, request.path)),
        Event::Response(response) => {
            let (method, path) = store
                .find_request(&response.id)
                .map(|r| (r.method.as_str(), r.path.as_str()))
                .unwrap_or(("?", "?"));
            Some(format!(
                "← {:<7} {} {} {}",
                method,
                path,
                response.status,
                format_timing(response.timing)
            ))
        }
        Event::Historic(entries) => Some(format!("Loaded {} earlier events", entries.len())),
        Event::WebsocketConnect(ws) => Some(format!("⇄ WS      {}", ws.path)),
        Event::WebsocketDisconnect(ws) => Some(format!("⇹ WS      {} closed ({})", ws.id, ws.close_code)),
        Event::WebsocketConnected(_) | Event::WebsocketInbound(_) | Event::WebsocketOutbound(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::store::tests::{request, response};

    #[test]
    fn test_describe_request_and_response() {
        let mut store = RequestStore::new();
        let req = request("r1", Method::Post, "/orders");
        store.apply_request(req.clone());

        assert_eq!(
            describe_event(&store, &Event::Request(req)).as_deref(),
            Some("→ POST    /orders")
        );
        assert_eq!(
            describe_event(&store, &Event::Response(response("r1", 201))).as_deref(),
            Some("← POST    /orders 201 50ms")
        );
        assert_eq!(
            describe_event(&store, &Event::Response(response("zz", 404))).as_deref(),
            Some("← ?       ? 404 50ms")
        );
    }

    #[test]
    fn test_options_merge_with_config() {
        let config = Config {
            regex_search: true,
            retry_delay_ms: 1500,
            ..Config::default()
        };

        let opts = WatchOptions {
            methods: vec![Method::Get, Method::Delete],
            search: Some("/api".to_string()),
            ..WatchOptions::default()
        };
        let filter = opts.view_filter(&config);
        assert!(filter.regex);
        assert_eq!(filter.search, "/api");
        assert!(filter.methods.contains(Method::Delete));
        assert!(!filter.methods.contains(Method::Post));
        assert_eq!(opts.reconnect_policy(&config).retry_delay, Duration::from_millis(1500));

        let opts = WatchOptions {
            retry_delay_ms: Some(0),
            ..WatchOptions::default()
        };
        assert!(opts.view_filter(&Config::default()).methods.is_any());
        assert_eq!(opts.reconnect_policy(&config).retry_delay, Duration::ZERO);
    }
}
