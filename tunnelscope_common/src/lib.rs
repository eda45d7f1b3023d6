//! Tunnelscope Common - Wire protocol for the traffic inspection stream
//!
//! This crate contains the event envelope, payload types and decoding helpers
//! shared by the console and its tests.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to parse frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Invalid base64 body: {0}")]
    Body(#[from] base64::DecodeError),
}

/// Ordered header pairs. Duplicate names are kept, so this is not a map.
pub type Headers = Vec<(String, String)>;

/// Find the first header with the given name (case-insensitive)
pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// HTTP methods the backend reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Connect,
        Method::Options,
        Method::Trace,
        Method::Patch,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(ProtocolError::InvalidFormat)
    }
}

/// One observed HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Correlation id, assigned once by the backend
    pub id: String,

    /// Capture time as sent by the backend
    pub timestamp: String,

    pub method: Method,

    /// Request path including query string
    pub path: String,

    pub headers: Headers,

    /// Base64 encoded body
    #[serde(default)]
    pub body: Option<String>,
}

/// One observed HTTP response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Matching id from the request
    pub id: String,

    pub status: u16,

    /// Elapsed time in seconds
    pub timing: f64,

    pub headers: Headers,

    /// Base64 encoded body
    #[serde(default)]
    pub body: Option<String>,
}

/// Body sent to the resend endpoint: the captured request without its id
#[derive(Debug, Serialize)]
pub struct ResendPayload<'a> {
    pub timestamp: &'a str,
    pub method: Method,
    pub path: &'a str,
    pub headers: &'a [(String, String)],
    pub body: Option<&'a str>,
}

impl RequestPayload {
    /// Parse the capture time. The backend may omit the UTC offset.
    pub fn captured_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// Decode the base64 body
    pub fn body_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        decode_body(self.body.as_deref())
    }

    /// Build the resend body for this request
    pub fn as_resend(&self) -> ResendPayload<'_> {
        ResendPayload {
            timestamp: &self.timestamp,
            method: self.method,
            path: &self.path,
            headers: &self.headers,
            body: self.body.as_deref(),
        }
    }
}

impl ResponsePayload {
    /// Decode the base64 body
    pub fn body_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        decode_body(self.body.as_deref())
    }
}

fn decode_body(body: Option<&str>) -> Result<Vec<u8>, ProtocolError> {
    match body {
        Some(b) if !b.is_empty() => Ok(STANDARD.decode(b)?),
        _ => Ok(Vec::new()),
    }
}

/// Parse an ISO-8601 timestamp with or without offset
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// WebSocket upgrade seen by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketConnectPayload {
    pub id: String,
    pub path: String,
    pub headers: Headers,
    pub timestamp: String,
}

/// WebSocket handshake completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketConnectedPayload {
    pub id: String,
    pub timing: f64,
}

/// A single WebSocket frame, inbound or outbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketFramePayload {
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// WebSocket connection closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketDisconnectPayload {
    pub id: String,
    pub timestamp: String,
    pub close_code: u16,
}

/// Events carried by the inspection stream
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Backlog captured before this client attached
    Historic(Vec<Event>),
    Request(RequestPayload),
    Response(ResponsePayload),
    WebsocketConnect(WebsocketConnectPayload),
    WebsocketConnected(WebsocketConnectedPayload),
    WebsocketInbound(WebsocketFramePayload),
    WebsocketOutbound(WebsocketFramePayload),
    WebsocketDisconnect(WebsocketDisconnectPayload),
}

/// Raw `{ type, payload }` envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl Event {
    /// Decode a single text frame
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        Self::from_envelope(envelope, true)
    }

    fn from_envelope(envelope: Envelope, allow_historic: bool) -> Result<Self, ProtocolError> {
        let Envelope { kind, payload } = envelope;
        let event = match kind.as_str() {
            "historic" if allow_historic => {
                let Value::Array(entries) = payload else {
                    return Err(ProtocolError::InvalidFormat);
                };
                // Entries are decoded one by one so a bad one doesn't sink the backlog
                let events = entries
                    .into_iter()
                    .filter_map(|entry| serde_json::from_value::<Envelope>(entry).ok())
                    .filter_map(|entry| Self::from_envelope(entry, false).ok())
                    .collect();
                Event::Historic(events)
            }
            "request" => Event::Request(serde_json::from_value(payload)?),
            "response" => Event::Response(serde_json::from_value(payload)?),
            "websocket_connect" => Event::WebsocketConnect(serde_json::from_value(payload)?),
            "websocket_connected" => Event::WebsocketConnected(serde_json::from_value(payload)?),
            "websocket_inbound" => Event::WebsocketInbound(serde_json::from_value(payload)?),
            "websocket_outbound" => Event::WebsocketOutbound(serde_json::from_value(payload)?),
            "websocket_disconnect" => Event::WebsocketDisconnect(serde_json::from_value(payload)?),
            _ => return Err(ProtocolError::UnknownType(kind)),
        };
        Ok(event)
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Historic(_) => "historic",
            Event::Request(_) => "request",
            Event::Response(_) => "response",
            Event::WebsocketConnect(_) => "websocket_connect",
            Event::WebsocketConnected(_) => "websocket_connected",
            Event::WebsocketInbound(_) => "websocket_inbound",
            Event::WebsocketOutbound(_) => "websocket_outbound",
            Event::WebsocketDisconnect(_) => "websocket_disconnect",
        }
    }
}

/// Decode a frame, discarding anything that doesn't parse
pub fn decode_frame(raw: &str) -> Option<Event> {
    Event::decode(raw).ok()
}

/// Public tunnel info served by the config endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub url: String,
}

/// Constants for the protocol
pub mod constants {
    /// Default port of the local inspection server
    pub const DEFAULT_INSPECT_PORT: u16 = 4040;

    /// WebSocket path of the event stream
    pub const INSPECT_PATH: &str = "/inspect/";

    /// Side-channel config endpoint
    pub const CONFIG_PATH: &str = "/config/";

    /// Resend endpoint
    pub const RESEND_PATH: &str = "/resend/";
}
