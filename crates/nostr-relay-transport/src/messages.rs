//! Nostr relay protocol frames (NIP-01).
//!
//! Only the pieces a publisher needs: the outgoing `EVENT` frame and the
//! `OK` / `NOTICE` replies relays send back.

use crate::{SignedEvent, TransportResult};
use serde_json::Value;

/// Build the `["EVENT", <event>]` frame for an event.
pub fn client_event_frame(event: &SignedEvent) -> TransportResult<String> {
    Ok(serde_json::to_string(&("EVENT", event))?)
}

/// A frame received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["OK", <event id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice(String),
    /// Any other well-formed frame, keyed by its label.
    Other(String),
}

impl RelayMessage {
    /// Parse a text frame. Returns `None` when the frame is not a labelled
    /// JSON array.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let items = value.as_array()?;
        let label = items.first()?.as_str()?;

        let message = match label {
            "OK" => Self::Ok {
                event_id: items.get(1)?.as_str()?.to_string(),
                accepted: items.get(2)?.as_bool()?,
                message: items
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "NOTICE" => Self::Notice(
                items
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            other => Self::Other(other.to_string()),
        };
        Some(message)
    }
}
