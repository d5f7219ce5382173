//! Signed nostr event.

use crate::{TransportError, TransportResult};
use serde::{Deserialize, Serialize};

/// An event as signed by its author.
///
/// The publisher never re-signs or re-validates; every field goes back to
/// the relays exactly as it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl SignedEvent {
    /// Rebuild an event from its stored JSON.
    pub fn from_json(raw: &str) -> TransportResult<Self> {
        let event: Self = serde_json::from_str(raw)
            .map_err(|e| TransportError::InvalidEvent(format!("unreadable payload: {}", e)))?;
        if event.id.trim().is_empty() {
            return Err(TransportError::InvalidEvent("event id is empty".to_string()));
        }
        Ok(event)
    }

    pub fn to_json(&self) -> TransportResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
