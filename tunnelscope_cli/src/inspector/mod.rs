//! Inspection engine: reconciles the event stream into request/response pairs

pub mod body;
mod client;
mod projection;
mod selection;
mod session;
pub(crate) mod store;

pub use client::InspectClient;
pub use projection::{MethodFilter, ViewFilter};
pub use session::{InspectSession, SessionAction, Snapshot};
pub use store::{RequestResponse, RequestStore, WebsocketSession};
