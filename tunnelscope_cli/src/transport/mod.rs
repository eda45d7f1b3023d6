//! Connection to the backend's inspection stream

mod connection;

pub use connection::{connect, ConnectionHandle, ReadyState, ReconnectPolicy, TransportEvent};
