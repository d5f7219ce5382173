//! Relay transport for pre-signed nostr events.
//!
//! This crate provides:
//! - The signed event model, carried to relays unchanged
//! - The `["EVENT", ...]` client frame and parsing of relay replies
//! - `RelayTransport` / `RelaySession`, the seam the publish worker drives
//! - `WebSocketTransport`, the tokio-tungstenite implementation

mod error;
mod event;
mod messages;
mod transport;
mod websocket;

pub use error::{TransportError, TransportResult};
pub use event::SignedEvent;
pub use messages::{client_event_frame, RelayMessage};
pub use transport::{RelaySession, RelayTransport};
pub use websocket::WebSocketTransport;
