//! HTTP side channel of the inspection server
//!
//! The event stream only carries traffic. Tunnel details and request replays
//! go through plain HTTP endpoints next to it.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tunnelscope_common::{constants, RequestPayload, TunnelConfig};

/// Client for the inspection server's HTTP endpoints
#[derive(Clone)]
pub struct InspectClient {
    base_url: String,
    client: Client,
}

impl InspectClient {
    /// Create a client for `base_url` (e.g. `http://localhost:4040`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL of the inspection server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the public tunnel details
    pub async fn fetch_config(&self) -> Result<TunnelConfig> {
        let url = format!("{}{}", self.base_url, constants::CONFIG_PATH);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch tunnel config")?;

        if !response.status().is_success() {
            anyhow::bail!("Tunnel config request failed: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse tunnel config")
    }

    /// Ask the backend to replay a captured request.
    ///
    /// The replay shows up later on the event stream like any other request.
    pub async fn resend(&self, request: &RequestPayload) -> Result<()> {
        let url = format!("{}{}", self.base_url, constants::RESEND_PATH);

        let response = self
            .client
            .post(&url)
            .json(&request.as_resend())
            .send()
            .await
            .context("Failed to resend request")?;

        if !response.status().is_success() {
            anyhow::bail!("Resend failed: {}", response.status());
        }

        tracing::debug!("Resent {} {}", request.method, request.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::store::tests::request;
    use axum::{extract::State, routing::{get, post}, Json, Router};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tunnelscope_common::Method;

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn spawn_backend() -> (String, Received) {
        async fn config() -> Json<serde_json::Value> {
            Json(serde_json::json!({ "url": "https://demo.example.com", "assets": "/assets/" }))
        }

        async fn resend(
            State(received): State<Received>,
            Json(body): Json<serde_json::Value>,
        ) -> Json<serde_json::Value> {
            received.lock().await.push(body);
            Json(serde_json::Value::Null)
        }

        let received: Received = Arc::default();
        let app = Router::new()
            .route("/config/", get(config))
            .route("/resend/", post(resend))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (format!("http://{}/", addr), received)
    }

    #[tokio::test]
    async fn test_fetch_config() {
        let (base, _) = spawn_backend().await;
        let client = InspectClient::new(base).unwrap();
        assert!(!client.base_url().ends_with('/'));

        let config = client.fetch_config().await.unwrap();
        assert_eq!(config.url, "https://demo.example.com");
    }

    #[tokio::test]
    async fn test_resend_strips_id() {
        let (base, received) = spawn_backend().await;
        let client = InspectClient::new(base).unwrap();

        client.resend(&request("r1", Method::Post, "/submit")).await.unwrap();

        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert!(received[0].get("id").is_none());
        assert_eq!(received[0]["path"], "/submit");
        assert_eq!(received[0]["method"], "POST");
    }
}
