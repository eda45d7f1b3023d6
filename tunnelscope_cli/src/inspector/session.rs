//! Inspection session: the single owner of all console state
//!
//! Transport notifications and user actions both land here, one at a time,
//! on the command driver's loop. Side effects (config fetch, resend) are
//! returned to the driver instead of being performed here.

use super::projection::{self, CompiledFilter, MethodFilter, ViewFilter};
use super::selection::Selection;
use super::store::{RequestResponse, RequestStore};
use crate::metrics::{self, TrafficSummary};
use crate::transport::{ReadyState, TransportEvent};
use std::sync::Arc;
use tunnelscope_common::{Event, Method, TunnelConfig};

/// Work the driver has to do after a transport notification
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// A connection just opened; fetch the tunnel config
    FetchConfig,
    /// An event was decoded and changed the store
    Applied(Event),
}

/// Joined pairs plus the arrival indices that pass the filter, newest first
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pairs: Arc<[RequestResponse]>,
    pub visible: Vec<usize>,
}

impl Snapshot {
    /// Visible rows with their arrival index
    pub fn rows(&self) -> Vec<(usize, &RequestResponse)> {
        self.visible.iter().map(|&i| (i, &self.pairs[i])).collect()
    }
}

pub struct InspectSession {
    store: RequestStore,
    selection: Selection,
    filter: ViewFilter,
    compiled: CompiledFilter,
    /// Visible indices for a store version, dropped when the filter changes
    projected: Option<(u64, Vec<usize>)>,
    ready_state: ReadyState,
    generation: Option<u64>,
    tunnel: Option<TunnelConfig>,
    raw_body: bool,
}

impl InspectSession {
    pub fn new(filter: ViewFilter) -> Self {
        let compiled = filter.compile();
        Self {
            store: RequestStore::new(),
            selection: Selection::default(),
            filter,
            compiled,
            projected: None,
            ready_state: ReadyState::Connecting,
            generation: None,
            tunnel: None,
            raw_body: false,
        }
    }

    /// Feed one transport notification.
    ///
    /// Readiness is not touched here; it only follows the transport's state
    /// channel through `set_ready_state`.
    pub fn handle_transport(&mut self, event: TransportEvent) -> Option<SessionAction> {
        match event {
            TransportEvent::Opened { generation } => {
                self.generation = Some(generation);
                Some(SessionAction::FetchConfig)
            }
            TransportEvent::Closed { generation } => {
                if self.is_current(generation) {
                    tracing::debug!(generation, "Inspect stream closed");
                }
                None
            }
            TransportEvent::Message { generation, raw } => {
                if !self.is_current(generation) {
                    tracing::debug!(generation, "Dropping frame from a stale connection");
                    return None;
                }
                self.handle_frame(&raw)
            }
        }
    }

    fn handle_frame(&mut self, raw: &str) -> Option<SessionAction> {
        let event = match Event::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Dropping frame: {}", e);
                return None;
            }
        };

        tracing::trace!("Received {} event", event.kind());
        if self.store.apply(event.clone()) {
            Some(SessionAction::Applied(event))
        } else {
            None
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == Some(generation)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
    }

    pub fn set_tunnel_config(&mut self, config: TunnelConfig) {
        self.tunnel = Some(config);
    }

    /// Public URL of the tunnel, once known
    pub fn tunnel_url(&self) -> Option<&str> {
        self.tunnel.as_ref().map(|t| t.url.as_str())
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// Current joined pairs and the filtered view over them
    pub fn snapshot(&mut self) -> Snapshot {
        let pairs = self.store.pairs();
        let version = self.store.version();

        if let Some((projected_at, visible)) = &self.projected {
            if *projected_at == version {
                return Snapshot {
                    pairs,
                    visible: visible.clone(),
                };
            }
        }

        let visible: Vec<usize> = projection::project(&pairs, &self.compiled)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        self.projected = Some((version, visible.clone()));
        Snapshot { pairs, visible }
    }

    pub fn summary(&mut self) -> TrafficSummary {
        let pairs = self.store.pairs();
        metrics::summarize(&pairs, self.store.websockets())
    }

    // Selection

    pub fn selected_index(&self) -> Option<usize> {
        self.selection.index()
    }

    /// The selected pair, looked up in the current snapshot
    pub fn selected(&mut self) -> Option<RequestResponse> {
        let pairs = self.store.pairs();
        self.selection.selected(&pairs).cloned()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn select_next(&mut self) {
        let snapshot = self.snapshot();
        self.selection.next(&snapshot.rows());
    }

    pub fn select_previous(&mut self) {
        let snapshot = self.snapshot();
        self.selection.previous(&snapshot.rows());
    }

    pub fn select_first(&mut self) {
        let snapshot = self.snapshot();
        self.selection.first(&snapshot.rows());
    }

    pub fn select_last(&mut self) {
        let snapshot = self.snapshot();
        self.selection.last(&snapshot.rows());
    }

    /// Drop all traffic and the selection together
    pub fn clear(&mut self) {
        self.store.clear();
        self.selection.clear();
    }

    // Filter

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    /// Compile error of the current search pattern
    pub fn filter_error(&self) -> Option<&str> {
        self.compiled.error()
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.filter.search = search.into();
        self.recompile();
    }

    pub fn toggle_regex(&mut self) {
        self.filter.regex = !self.filter.regex;
        self.recompile();
    }

    pub fn set_methods(&mut self, methods: MethodFilter) {
        self.filter.methods = methods;
        self.recompile();
    }

    pub fn cycle_methods(&mut self) {
        self.filter.methods.cycle();
        self.recompile();
    }

    /// Show or hide a single method
    pub fn toggle_method(&mut self, method: Method) {
        self.filter.methods.toggle(method);
        self.recompile();
    }

    fn recompile(&mut self) {
        self.compiled = self.filter.compile();
        self.projected = None;
    }

    // Detail view

    pub fn raw_body(&self) -> bool {
        self.raw_body
    }

    pub fn toggle_raw_body(&mut self) {
        self.raw_body = !self.raw_body;
    }
}

impl Default for InspectSession {
    fn default() -> Self {
        Self::new(ViewFilter::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(generation: u64, raw: &str) -> TransportEvent {
        TransportEvent::Message {
            generation,
            raw: raw.to_string(),
        }
    }

    fn request_frame(id: &str, method: &str, path: &str) -> String {
        format!(
            r#"{{"type":"request","payload":{{"id":"{id}","timestamp":"2024-03-01T10:15:30","method":"{method}","path":"{path}","headers":[],"body":""}}}}"#
        )
    }

    fn response_frame(id: &str, status: u16) -> String {
        format!(
            r#"{{"type":"response","payload":{{"id":"{id}","status":{status},"timing":0.01,"headers":[],"body":""}}}}"#
        )
    }

    fn historic_frame(entries: &[String]) -> String {
        format!(r#"{{"type":"historic","payload":[{}]}}"#, entries.join(","))
    }

    fn summary(session: &mut InspectSession) -> Vec<(String, Option<u16>)> {
        session
            .snapshot()
            .pairs
            .iter()
            .map(|p| (p.request.id.clone(), p.response.as_ref().map(|r| r.status)))
            .collect()
    }

    #[test]
    fn test_opened_requests_config_fetch() {
        let mut session = InspectSession::default();
        assert_eq!(session.ready_state(), ReadyState::Connecting);
        assert_eq!(
            session.handle_transport(TransportEvent::Opened { generation: 1 }),
            Some(SessionAction::FetchConfig)
        );
    }

    #[test]
    fn test_readiness_follows_state_channel_only() {
        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });
        session.set_ready_state(ReadyState::Open);

        // The watch already moved on to the next attempt when the queued close lands
        session.set_ready_state(ReadyState::Connecting);
        session.handle_transport(TransportEvent::Closed { generation: 1 });
        assert_eq!(session.ready_state(), ReadyState::Connecting);

        session.handle_transport(TransportEvent::Opened { generation: 2 });
        assert_eq!(session.ready_state(), ReadyState::Connecting);
        session.set_ready_state(ReadyState::Open);
        assert_eq!(session.ready_state(), ReadyState::Open);
    }

    #[test]
    fn test_request_then_response() {
        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });

        session.handle_transport(message(1, &request_frame("r1", "GET", "/x")));
        assert_eq!(summary(&mut session), vec![("r1".to_string(), None)]);

        session.handle_transport(message(1, &response_frame("r1", 200)));
        assert_eq!(summary(&mut session), vec![("r1".to_string(), Some(200))]);
    }

    #[test]
    fn test_garbage_frames_are_dropped() {
        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });

        assert_eq!(session.handle_transport(message(1, "{not json")), None);
        assert_eq!(
            session.handle_transport(message(1, r#"{"type":"mystery","payload":null}"#)),
            None
        );
        assert_eq!(session.store().version(), 0);
    }

    #[test]
    fn test_reconnect_does_not_duplicate_history() {
        let backlog = historic_frame(&[
            request_frame("r1", "GET", "/a"),
            response_frame("r1", 200),
            request_frame("r2", "POST", "/b"),
        ]);

        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });
        assert!(matches!(
            session.handle_transport(message(1, &backlog)),
            Some(SessionAction::Applied(Event::Historic(_)))
        ));
        session.handle_transport(TransportEvent::Closed { generation: 1 });

        // Backend replays the same backlog plus one new request
        session.handle_transport(TransportEvent::Opened { generation: 2 });
        let replay = historic_frame(&[
            request_frame("r1", "GET", "/a"),
            response_frame("r1", 200),
            request_frame("r2", "POST", "/b"),
            response_frame("r2", 201),
        ]);
        assert_eq!(session.handle_transport(message(2, &replay)), None);
        session.handle_transport(message(2, &response_frame("r2", 201)));

        assert_eq!(
            summary(&mut session),
            vec![("r1".to_string(), Some(200)), ("r2".to_string(), Some(201))]
        );
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });
        session.handle_transport(TransportEvent::Opened { generation: 2 });

        assert_eq!(
            session.handle_transport(message(1, &request_frame("r1", "GET", "/old"))),
            None
        );
        session.handle_transport(TransportEvent::Closed { generation: 1 });
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_projection_order_and_selection() {
        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });
        for (id, method) in [("a", "GET"), ("b", "POST"), ("c", "GET")] {
            session.handle_transport(message(1, &request_frame(id, method, "/")));
        }

        assert_eq!(session.snapshot().visible, vec![2, 1, 0]);

        session.select_next();
        assert_eq!(session.selected_index(), Some(2));
        session.select_next();
        assert_eq!(session.selected().map(|p| p.request.id), Some("b".to_string()));

        session.set_methods(MethodFilter::only(Method::Get));
        assert_eq!(session.snapshot().visible, vec![2, 0]);
        // Selection is kept by arrival index even when filtered out
        assert_eq!(session.selected_index(), Some(1));
    }

    #[test]
    fn test_clear_resets_traffic_and_selection() {
        let mut session = InspectSession::default();
        session.handle_transport(TransportEvent::Opened { generation: 1 });
        session.handle_transport(message(1, &request_frame("r1", "GET", "/x")));
        session.select_first();
        assert_eq!(session.selected_index(), Some(0));

        session.clear();
        assert!(session.snapshot().pairs.is_empty());
        assert_eq!(session.selected_index(), None);
        assert!(session.selected().is_none());
    }

    #[test]
    fn test_filter_editing() {
        let mut session = InspectSession::default();
        session.set_search("(");
        assert!(session.filter_error().is_none());
        session.toggle_regex();
        assert!(session.filter_error().is_some());
        session.set_search("x");
        assert!(session.filter_error().is_none());

        session.cycle_methods();
        assert_eq!(session.filter().methods.label(), "GET");
        session.toggle_method(Method::Post);
        assert_eq!(session.filter().methods.label(), "CUSTOM");
        session.set_methods(MethodFilter::none());
        session.toggle_method(Method::Delete);
        assert_eq!(session.filter().methods.label(), "DELETE");
    }
}
