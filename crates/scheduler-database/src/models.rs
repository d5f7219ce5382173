//! Database model types.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Scheduled event record - a pre-signed event waiting for, or past, delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Event fingerprint, taken from the signed payload.
    pub id: String,
    /// Signed event exactly as submitted.
    pub event_json: String,
    pub publish_at: DateTime<Utc>,
    /// Legacy flag, true iff `status` is `sent`.
    pub sent: bool,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl ScheduledEvent {
    /// Attempt number the next delivery try will carry.
    pub fn next_attempt(&self) -> u32 {
        self.attempt_count.saturating_add(1)
    }

    /// Whether a delivery attempt may be made at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal()
            && self.publish_at <= now
            && self.next_attempt_at.map_or(true, |next| next <= now)
    }
}

/// Delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Scheduled,
    Retrying,
    Sent,
    Error,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Retrying => "retrying",
            Self::Sent => "sent",
            Self::Error => "error",
        }
    }

    /// Parse a stored status; anything unrecognised is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "retrying" => Some(Self::Retrying),
            "sent" => Some(Self::Sent),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// `sent` and `error` only leave through an explicit reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Error)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New scheduled event for insertion.
#[derive(Debug, Clone)]
pub struct NewScheduledEvent {
    pub id: String,
    pub event_json: String,
    pub publish_at: DateTime<Utc>,
}

/// Result of one delivery attempt, applied by [`crate::queries::apply_delivery_outcomes`].
///
/// `attempt` is the 1-based number of the attempt that produced the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent {
        id: String,
        attempt: u32,
    },
    Failed {
        id: String,
        attempt: u32,
        error: String,
    },
}

impl DeliveryOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Sent { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            Self::Sent { attempt, .. } | Self::Failed { attempt, .. } => *attempt,
        }
    }
}

/// Number of events per delivery status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub scheduled: u64,
    pub retrying: u64,
    pub sent: u64,
    pub error: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.scheduled + self.retrying + self.sent + self.error
    }
}

/// Earliest and latest years a stored timestamp may carry.
pub const MIN_TIMESTAMP_YEAR: i32 = 1;
pub const MAX_TIMESTAMP_YEAR: i32 = 9999;

/// Latest canonical timestamp; later retry times are clamped to it.
pub const LATEST_TIMESTAMP: &str = "9999-12-31T23:59:59.999999Z";

/// Canonical stored timestamp: RFC 3339, UTC, microseconds, `Z` suffix.
///
/// Within [`is_storable`] range every value has the same width, so SQL string
/// comparison orders them chronologically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Whether `ts` has a four-digit year and so formats to a canonical value.
pub fn is_storable(ts: DateTime<Utc>) -> bool {
    (MIN_TIMESTAMP_YEAR..=MAX_TIMESTAMP_YEAR).contains(&ts.year())
}

/// Parse a timestamp from storage or user input.
///
/// Accepts RFC 3339 with any offset, and naive `YYYY-MM-DDTHH:MM[:SS[.f]]`
/// (or space separated) values, which are read as UTC. Values outside
/// [`is_storable`] range are rejected.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    parse_any_timestamp(s).filter(|ts| is_storable(*ts))
}

fn parse_any_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
