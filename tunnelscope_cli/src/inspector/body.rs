//! Body and timing presentation helpers for the detail view

use thiserror::Error;
use tunnelscope_common::{header, ProtocolError};

/// Why a body couldn't be shown in its rendered form
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("body is not valid base64: {0}")]
    Decode(#[from] ProtocolError),

    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no renderer for content type {0:?}")]
    NotRenderable(String),
}

/// A body prepared for display
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedBody {
    Empty,
    Text(String),
    Json(String),
    Binary { content_type: String, len: usize },
}

/// Content type without parameters, lower-cased
pub fn content_type(headers: &[(String, String)]) -> String {
    header(headers, "content-type")
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// "<length>bytes; <content-type>" for the detail header
pub fn content_summary(headers: &[(String, String)]) -> String {
    let length = header(headers, "content-length").map(|v| format!("{}bytes", v));
    let kind = header(headers, "content-type").map(str::to_string);
    [length, kind].into_iter().flatten().collect::<Vec<_>>().join("; ")
}

/// Render a decoded body for display
pub fn render(
    headers: &[(String, String)],
    body: Result<Vec<u8>, ProtocolError>,
    raw: bool,
) -> Result<RenderedBody, RenderError> {
    let bytes = body?;

    if raw {
        return Ok(RenderedBody::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }
    if bytes.is_empty() {
        return Ok(RenderedBody::Empty);
    }

    let content_type = content_type(headers);
    if content_type.contains("json") {
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        return Ok(RenderedBody::Json(serde_json::to_string_pretty(&value)?));
    }

    if is_textual(&content_type) {
        return Ok(RenderedBody::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }

    if is_media(&content_type) {
        return Ok(RenderedBody::Binary {
            content_type,
            len: bytes.len(),
        });
    }

    Err(RenderError::NotRenderable(content_type))
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.ends_with("xml")
        || content_type.ends_with("javascript")
        || content_type == "application/x-www-form-urlencoded"
}

fn is_media(content_type: &str) -> bool {
    ["image/", "audio/", "video/"]
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
        || content_type == "application/pdf"
}

/// Format a timing in seconds: milliseconds below one second, seconds above
pub fn format_timing(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "-".to_string();
    }
    let rounded = (seconds * 1000.0).round() / 1000.0;
    if rounded > 1.0 {
        format!("{}s", rounded)
    } else {
        format!("{}ms", (rounded * 1000.0).round() as u64)
    }
}

/// Status code classes used for colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
    Unknown,
}

impl StatusClass {
    pub fn of(status: Option<u16>) -> Self {
        match status {
            None => StatusClass::Pending,
            Some(100..=199) => StatusClass::Informational,
            Some(200..=299) => StatusClass::Success,
            Some(300..=399) => StatusClass::Redirect,
            Some(400..=499) => StatusClass::ClientError,
            Some(500..=599) => StatusClass::ServerError,
            Some(_) => StatusClass::Unknown,
        }
    }
}
