//! Request storage and request/response reconciliation for the inspector

use std::collections::HashMap;
use std::sync::Arc;
use tunnelscope_common::{
    Event, RequestPayload, ResponsePayload, WebsocketConnectPayload, WebsocketFramePayload,
};

/// A request joined with its response, if one has arrived
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResponse {
    pub request: RequestPayload,
    pub response: Option<ResponsePayload>,
}

impl RequestResponse {
    /// Whether the response is still outstanding
    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}

/// Direction of a proxied WebSocket frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    Inbound,
    Outbound,
}

/// A WebSocket connection seen through the tunnel
#[derive(Debug, Clone, PartialEq)]
pub struct WebsocketSession {
    pub connect: WebsocketConnectPayload,
    /// Handshake time in seconds, once connected
    pub timing: Option<f64>,
    pub frames: Vec<(FrameDirection, WebsocketFramePayload)>,
    pub close_code: Option<u16>,
}

impl WebsocketSession {
    pub fn is_open(&self) -> bool {
        self.close_code.is_none()
    }
}

/// Accumulates stream events and joins requests to responses
#[derive(Debug, Default)]
pub struct RequestStore {
    requests: Vec<RequestPayload>,
    responses: Vec<ResponsePayload>,
    websockets: Vec<WebsocketSession>,
    historic_applied: bool,
    version: u64,
    joined: Option<(u64, Arc<[RequestResponse]>)>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply any decoded event. Returns true if the store changed.
    pub fn apply(&mut self, event: Event) -> bool {
        match event {
            Event::Historic(events) => self.apply_historic(events),
            Event::Request(request) => {
                self.apply_request(request);
                true
            }
            Event::Response(response) => {
                self.apply_response(response);
                true
            }
            Event::WebsocketConnect(connect) => {
                self.websockets.push(WebsocketSession {
                    connect,
                    timing: None,
                    frames: Vec::new(),
                    close_code: None,
                });
                self.bump();
                true
            }
            Event::WebsocketConnected(connected) => self.update_websocket(&connected.id, |ws| {
                ws.timing = Some(connected.timing);
            }),
            Event::WebsocketInbound(frame) => self.update_websocket(&frame.id.clone(), |ws| {
                ws.frames.push((FrameDirection::Inbound, frame));
            }),
            Event::WebsocketOutbound(frame) => self.update_websocket(&frame.id.clone(), |ws| {
                ws.frames.push((FrameDirection::Outbound, frame));
            }),
            Event::WebsocketDisconnect(disconnect) => self.update_websocket(&disconnect.id, |ws| {
                ws.close_code = Some(disconnect.close_code);
            }),
        }
    }

    /// Apply the backlog sent right after connecting.
    ///
    /// Only the first backlog of a session is accepted; a replay after a
    /// reconnect would duplicate everything already held in memory.
    pub fn apply_historic(&mut self, events: Vec<Event>) -> bool {
        if self.historic_applied {
            tracing::debug!("Ignoring historic replay of {} events", events.len());
            return false;
        }
        self.historic_applied = true;

        for event in events {
            if matches!(event, Event::Historic(_)) {
                continue;
            }
            self.apply(event);
        }
        self.bump();
        true
    }

    /// Record a request in arrival order
    pub fn apply_request(&mut self, request: RequestPayload) {
        self.requests.push(request);
        self.bump();
    }

    /// Record a response in arrival order
    pub fn apply_response(&mut self, response: ResponsePayload) {
        self.responses.push(response);
        self.bump();
    }

    /// Join every request with the first response sharing its id, in request
    /// arrival order
    pub fn join(&self) -> Vec<RequestResponse> {
        let mut by_id: HashMap<&str, &ResponsePayload> = HashMap::with_capacity(self.responses.len());
        for response in &self.responses {
            by_id.entry(response.id.as_str()).or_insert(response);
        }

        self.requests
            .iter()
            .map(|request| RequestResponse {
                request: request.clone(),
                response: by_id.get(request.id.as_str()).map(|r| (*r).clone()),
            })
            .collect()
    }

    /// Joined snapshot, recomputed only when the store has changed
    pub fn pairs(&mut self) -> Arc<[RequestResponse]> {
        if let Some((version, pairs)) = &self.joined {
            if *version == self.version {
                return pairs.clone();
            }
        }

        let pairs: Arc<[RequestResponse]> = self.join().into();
        self.joined = Some((self.version, pairs.clone()));
        pairs
    }

    /// Find a request by correlation id
    pub fn find_request(&self, id: &str) -> Option<&RequestPayload> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// WebSocket sessions in arrival order
    pub fn websockets(&self) -> &[WebsocketSession] {
        &self.websockets
    }

    /// Number of captured requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Mutation counter
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Drop all captured traffic. The session keeps its historic marker.
    pub fn clear(&mut self) {
        self.requests.clear();
        self.responses.clear();
        self.websockets.clear();
        self.bump();
    }

    fn update_websocket(&mut self, id: &str, f: impl FnOnce(&mut WebsocketSession)) -> bool {
        match self.websockets.iter_mut().rev().find(|ws| ws.connect.id == id) {
            Some(ws) => {
                f(ws);
                self.bump();
                true
            }
            None => {
                tracing::debug!("Ignoring websocket event for unknown connection {}", id);
                false
            }
        }
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tunnelscope_common::{Method, WebsocketConnectedPayload, WebsocketDisconnectPayload};

    pub(crate) fn request(id: &str, method: Method, path: &str) -> RequestPayload {
        RequestPayload {
            id: id.to_string(),
            timestamp: "2024-03-01T10:15:30".to_string(),
            method,
            path: path.to_string(),
            headers: vec![("Host".to_string(), "example.com".to_string())],
            body: None,
        }
    }

    pub(crate) fn response(id: &str, status: u16) -> ResponsePayload {
        ResponsePayload {
            id: id.to_string(),
            status,
            timing: 0.05,
            headers: Vec::new(),
            body: None,
        }
    }

    pub(crate) fn websocket_connect(id: &str) -> Event {
        Event::WebsocketConnect(WebsocketConnectPayload {
            id: id.to_string(),
            path: "/live".to_string(),
            headers: Vec::new(),
            timestamp: "2024-03-01T10:15:30".to_string(),
        })
    }

    fn ids(pairs: &[RequestResponse]) -> Vec<(&str, Option<u16>)> {
        pairs
            .iter()
            .map(|p| (p.request.id.as_str(), p.response.as_ref().map(|r| r.status)))
            .collect()
    }

    #[test]
    fn test_request_then_response_joins() {
        let mut store = RequestStore::new();
        store.apply_request(request("r1", Method::Get, "/x"));
        assert_eq!(ids(&store.join()), vec![("r1", None)]);

        store.apply_response(response("r1", 200));
        let pairs = store.join();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].request.path, "/x");
        assert_eq!(pairs[0].response.as_ref().map(|r| r.status), Some(200));
    }

    #[test]
    fn test_join_follows_request_order_for_any_interleaving() {
        let mut store = RequestStore::new();
        // Response for r2 arrives before its request and before r1's response
        store.apply_request(request("r1", Method::Get, "/a"));
        store.apply_response(response("r2", 404));
        store.apply_request(request("r2", Method::Post, "/b"));
        store.apply_request(request("r3", Method::Get, "/c"));
        store.apply_response(response("r1", 200));

        assert_eq!(
            ids(&store.join()),
            vec![("r1", Some(200)), ("r2", Some(404)), ("r3", None)]
        );
    }

    #[test]
    fn test_first_response_wins_on_duplicate_ids() {
        let mut store = RequestStore::new();
        store.apply_request(request("r1", Method::Get, "/a"));
        store.apply_response(response("r1", 200));
        store.apply_response(response("r1", 500));
        assert_eq!(ids(&store.join()), vec![("r1", Some(200))]);
    }

    #[test]
    fn test_second_historic_batch_is_ignored() {
        let mut store = RequestStore::new();
        let backlog = vec![
            Event::Request(request("r1", Method::Get, "/a")),
            Event::Response(response("r1", 200)),
        ];

        assert!(store.apply_historic(backlog.clone()));
        let before = store.join();
        let version = store.version();

        assert!(!store.apply(Event::Historic(backlog)));
        assert_eq!(store.join(), before);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_clear_empties_join_but_keeps_historic_marker() {
        let mut store = RequestStore::new();
        store.apply_historic(vec![Event::Request(request("r1", Method::Get, "/a"))]);
        store.apply_request(request("r2", Method::Get, "/b"));

        store.clear();
        assert!(store.join().is_empty());
        assert!(store.is_empty());

        assert!(!store.apply_historic(vec![Event::Request(request("r1", Method::Get, "/a"))]));
        assert!(store.is_empty());
    }

    #[test]
    fn test_pairs_snapshot_is_cached_by_version() {
        let mut store = RequestStore::new();
        store.apply_request(request("r1", Method::Get, "/a"));

        let first = store.pairs();
        let second = store.pairs();
        assert!(Arc::ptr_eq(&first, &second));

        store.apply_response(response("r1", 201));
        let third = store.pairs();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third[0].response.as_ref().map(|r| r.status), Some(201));
        // Earlier snapshots are untouched
        assert!(first[0].is_pending());
    }

    #[test]
    fn test_websocket_events_are_tracked_outside_the_join() {
        let mut store = RequestStore::new();
        store.apply(websocket_connect("w1"));
        assert!(store.websockets()[0].is_open());
        store.apply(Event::WebsocketConnected(WebsocketConnectedPayload {
            id: "w1".to_string(),
            timing: 0.2,
        }));
        store.apply(Event::WebsocketInbound(WebsocketFramePayload {
            id: "w1".to_string(),
            timestamp: "2024-03-01T10:15:31".to_string(),
            body: Some("aGk=".to_string()),
        }));
        store.apply(Event::WebsocketDisconnect(WebsocketDisconnectPayload {
            id: "w1".to_string(),
            timestamp: "2024-03-01T10:15:32".to_string(),
            close_code: 1000,
        }));
        assert!(!store.apply(Event::WebsocketConnected(WebsocketConnectedPayload {
            id: "unknown".to_string(),
            timing: 0.1,
        })));

        let ws = &store.websockets()[0];
        assert_eq!(ws.timing, Some(0.2));
        assert_eq!(ws.frames.len(), 1);
        assert_eq!(ws.frames[0].0, FrameDirection::Inbound);
        assert!(!ws.is_open());
        assert!(store.join().is_empty());
    }
}
