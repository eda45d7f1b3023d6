//! Persistent WebSocket connection to the inspection stream
//!
//! One task owns at most one socket at a time. Every connect attempt gets a
//! new generation number and every notification carries it, so consumers can
//! discard anything that still trickles in from a replaced socket.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Buffered notifications before the transport waits on the consumer
const EVENT_BUFFER: usize = 256;

/// Readiness of the inspection stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "online",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "offline",
        }
    }
}

/// Notifications emitted by the connection task
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened { generation: u64 },
    Closed { generation: u64 },
    Message { generation: u64, raw: String },
}

/// How to behave between connect attempts
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Pause after a connect attempt fails. A socket that was open and then
    /// closed is always retried immediately.
    pub retry_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Handle to the running connection task
pub struct ConnectionHandle {
    state_rx: watch::Receiver<ReadyState>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Current readiness state
    pub fn ready_state(&self) -> ReadyState {
        *self.state_rx.borrow()
    }

    /// Watch readiness changes
    pub fn subscribe(&self) -> watch::Receiver<ReadyState> {
        self.state_rx.clone()
    }

    /// Close the socket and stop reconnecting
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::debug!("Connection task ended abnormally: {}", e);
        }
    }
}

/// Open a self-reconnecting connection to `url`
pub fn connect(
    url: impl Into<String>,
    policy: ReconnectPolicy,
) -> (ConnectionHandle, mpsc::Receiver<TransportEvent>) {
    let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

    let task = tokio::spawn(run(url.into(), policy, state_tx, events_tx, shutdown_rx));

    let handle = ConnectionHandle {
        state_rx,
        shutdown_tx,
        task,
    };
    (handle, events_rx)
}

/// What to do once a socket is gone
enum Flow {
    Reconnect,
    Stop,
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ReadyState>,
    events_tx: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut generation = 0u64;

    loop {
        generation += 1;
        state_tx.send_replace(ReadyState::Connecting);
        tracing::debug!(generation, "Connecting to {}", url);

        let attempt = tokio::select! {
            attempt = connect_async(url.as_str()) => attempt,
            _ = shutdown.changed() => break,
        };

        match attempt {
            Ok((ws, _)) => {
                state_tx.send_replace(ReadyState::Open);
                tracing::info!(generation, "Inspect stream connected");
                if events_tx.send(TransportEvent::Opened { generation }).await.is_err() {
                    break;
                }

                let flow = pump(ws, generation, &state_tx, &events_tx, &mut shutdown).await;

                state_tx.send_replace(ReadyState::Closed);
                let delivered = events_tx.send(TransportEvent::Closed { generation }).await.is_ok();
                if matches!(flow, Flow::Stop) || !delivered {
                    break;
                }
                tracing::info!(generation, "Inspect stream closed, reconnecting");
            }
            Err(e) => {
                tracing::debug!(generation, "Failed to connect to {}: {}", url, e);
                state_tx.send_replace(ReadyState::Closed);
                if events_tx.send(TransportEvent::Closed { generation }).await.is_err() {
                    break;
                }
                if !policy.retry_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(policy.retry_delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
    }

    state_tx.send_replace(ReadyState::Closed);
}

/// Forward frames from one socket until it goes away
async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    generation: u64,
    state_tx: &watch::Sender<ReadyState>,
    events_tx: &mpsc::Sender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Flow {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                let raw = match msg {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(raw) => raw,
                        Err(_) => {
                            tracing::debug!(generation, "Dropping non UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(generation, ?frame, "Server is closing the inspect stream");
                        state_tx.send_replace(ReadyState::Closing);
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(generation, "Inspect stream error: {}", e);
                        return Flow::Reconnect;
                    }
                    None => return Flow::Reconnect,
                };

                if events_tx.send(TransportEvent::Message { generation, raw }).await.is_err() {
                    return Flow::Stop;
                }
            }
            _ = shutdown.changed() => {
                state_tx.send_replace(ReadyState::Closing);
                let _ = write.send(Message::Close(None)).await;
                return Flow::Stop;
            }
        }
    }
}
