//! Submission and inspection of scheduled events.
//!
//! `ScheduleService` is the front door to the event store for anything that
//! is not the publish worker: it validates submissions, lists events with
//! their delivery state, and resets events for another round of attempts.

mod error;

pub use error::{ServiceError, ServiceResult};

use chrono::{DateTime, Utc};
use scheduler_database::{
    format_timestamp, parse_timestamp, queries, AsyncDatabase, DeliveryStatus, NewScheduledEvent,
    ScheduledEvent, StatusCounts,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Characters of content shown in listings.
const PREVIEW_CHARS: usize = 80;

/// One event as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub id: String,
    pub pubkey: Option<String>,
    pub kind: Option<u64>,
    pub content_preview: String,
    pub publish_at: String,
    pub sent: bool,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<String>,
    pub next_attempt_at: Option<String>,
}

impl From<&ScheduledEvent> for EventView {
    fn from(event: &ScheduledEvent) -> Self {
        let payload: Option<Value> = serde_json::from_str(&event.event_json).ok();
        let field = |name: &str| payload.as_ref().and_then(|p| p.get(name));

        Self {
            id: event.id.clone(),
            pubkey: field("pubkey").and_then(Value::as_str).map(str::to_string),
            kind: field("kind").and_then(Value::as_u64),
            content_preview: field("content")
                .and_then(Value::as_str)
                .map(preview)
                .unwrap_or_default(),
            publish_at: format_timestamp(event.publish_at),
            sent: event.sent,
            status: event.status,
            attempt_count: event.attempt_count,
            last_error: event.last_error.clone(),
            last_attempt_at: event.last_attempt_at.map(format_timestamp),
            next_attempt_at: event.next_attempt_at.map(format_timestamp),
        }
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

/// Submission, listing and reset over the event store.
#[derive(Clone)]
pub struct ScheduleService {
    db: AsyncDatabase,
}

impl ScheduleService {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    /// Schedule a signed event for `publish_at`.
    ///
    /// `publish_at` is RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` read as
    /// UTC, and must be strictly after `now`. Returns the event id.
    pub async fn submit(
        &self,
        event: &Value,
        publish_at: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<String> {
        self.store(event, event.to_string(), publish_at, now).await
    }

    /// Like [`submit`](Self::submit), keeping the submitted JSON text as is.
    pub async fn submit_raw(
        &self,
        event_json: &str,
        publish_at: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let event: Value = serde_json::from_str(event_json)
            .map_err(|e| ServiceError::InvalidInput(format!("event is not valid JSON: {}", e)))?;
        self.store(&event, event_json.trim().to_string(), publish_at, now)
            .await
    }

    async fn store(
        &self,
        event: &Value,
        event_json: String,
        publish_at: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let id = event_id(event)?;
        let publish_at = parse_publish_at(publish_at, now)?;

        let new_event = NewScheduledEvent {
            id: id.clone(),
            event_json,
            publish_at,
        };
        self.db
            .call(move |conn| queries::insert_scheduled_event(conn, &new_event, now))
            .await?;

        info!(event_id = %id, publish_at = %format_timestamp(publish_at), "Event scheduled");
        Ok(id)
    }

    /// All events, newest-scheduled first, optionally only one author's.
    pub async fn list(&self, pubkey: Option<&str>) -> ServiceResult<Vec<EventView>> {
        let pubkey = pubkey.map(str::to_string);
        let events = self
            .db
            .call(move |conn| queries::list_scheduled_events(conn, pubkey.as_deref()))
            .await?;
        Ok(events.iter().map(EventView::from).collect())
    }

    pub async fn get(&self, id: &str) -> ServiceResult<EventView> {
        let lookup = id.to_string();
        self.db
            .call(move |conn| queries::get_scheduled_event(conn, &lookup))
            .await?
            .map(|event| EventView::from(&event))
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Put an event back in the queue with a clean slate.
    pub async fn reset(&self, id: &str) -> ServiceResult<()> {
        let target = id.to_string();
        self.db
            .call(move |conn| queries::reset_scheduled_event(conn, &target))
            .await?;
        info!(event_id = %id, "Event reset for retry");
        Ok(())
    }

    pub async fn status_counts(&self) -> ServiceResult<StatusCounts> {
        Ok(self.db.call(queries::count_events_by_status).await?)
    }
}

fn event_id(event: &Value) -> ServiceResult<String> {
    let object = event
        .as_object()
        .ok_or_else(|| ServiceError::InvalidInput("event must be a JSON object".to_string()))?;

    match object.get("id").and_then(Value::as_str).map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ServiceError::InvalidInput("Missing event ID".to_string())),
    }
}

/// Years outside 1..=9999 do not parse, so they are rejected here too.
fn parse_publish_at(raw: &str, now: DateTime<Utc>) -> ServiceResult<DateTime<Utc>> {
    let publish_at = parse_timestamp(raw).ok_or_else(|| {
        ServiceError::InvalidInput(format!(
            "publish_at is not a valid timestamp in years 1-9999: {}",
            raw
        ))
    })?;
    if publish_at <= now {
        return Err(ServiceError::InvalidInput(
            "publish_at must be in the future".to_string(),
        ));
    }
    Ok(publish_at)
}
