//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter and the current
//! time where it matters, so callers (and tests) control the clock.

use crate::models::{format_timestamp, is_storable, parse_timestamp, LATEST_TIMESTAMP};
use crate::{
    DatabaseError, DatabaseResult, DeliveryOutcome, DeliveryStatus, NewScheduledEvent,
    ScheduledEvent, StatusCounts,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use scheduler_config_and_utils::RetryPolicy;
use tracing::{debug, warn};

const EVENT_COLUMNS: &str = "id, event_json, publish_at, sent, status, attempt_count, \
                             last_error, last_attempt_at, next_attempt_at";

// ==========================================
// Submission
// ==========================================

/// Insert a new scheduled event.
///
/// Fails with [`DatabaseError::Conflict`] when the id is already stored. The
/// primary key enforces this, so concurrent submitters cannot both succeed.
/// `publish_at` must be in the future and within a four-digit year.
pub fn insert_scheduled_event(
    conn: &Connection,
    event: &NewScheduledEvent,
    now: DateTime<Utc>,
) -> DatabaseResult<ScheduledEvent> {
    if !is_storable(event.publish_at) {
        return Err(DatabaseError::InvalidData(format!(
            "publish_at {} is outside the supported range",
            event.publish_at
        )));
    }
    if event.publish_at <= now {
        return Err(DatabaseError::InvalidData(format!(
            "publish_at {} is not in the future",
            format_timestamp(event.publish_at)
        )));
    }

    let result = conn.execute(
        "INSERT INTO scheduled_events (id, event_json, publish_at, sent, status, attempt_count)
         VALUES (?1, ?2, ?3, 0, 'scheduled', 0)",
        params![event.id, event.event_json, format_timestamp(event.publish_at)],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            return Err(DatabaseError::Conflict(event.id.clone()));
        }
        Err(e) => return Err(e.into()),
    }

    get_scheduled_event(conn, &event.id)?
        .ok_or_else(|| DatabaseError::NotFound("Event not found after insert".to_string()))
}

// ==========================================
// Reads
// ==========================================

/// Get a scheduled event by ID.
pub fn get_scheduled_event(
    conn: &Connection,
    id: &str,
) -> DatabaseResult<Option<ScheduledEvent>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM scheduled_events WHERE id = ?1",
        EVENT_COLUMNS
    ))?;

    let result = stmt.query_row(params![id], row_to_event);

    match result {
        Ok(event) => Ok(Some(event)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Events eligible for a delivery attempt at `now`, oldest `publish_at` first.
///
/// Rows that cannot be read back are logged and left out, so one corrupt row
/// never holds up the rest of the queue.
pub fn query_due_events(
    conn: &Connection,
    now: DateTime<Utc>,
) -> DatabaseResult<Vec<ScheduledEvent>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM scheduled_events
         WHERE status IN ('scheduled', 'retrying')
           AND publish_at <= ?1
           AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
         ORDER BY publish_at ASC, id ASC",
        EVENT_COLUMNS
    ))?;

    let rows = stmt.query_map(params![format_timestamp(now)], read_row)?;
    readable_events(rows)
}

/// List events newest-scheduled first, optionally only those signed by `pubkey`.
///
/// Payloads that are not valid JSON never match a pubkey filter but are still
/// listed without one. Unreadable rows are skipped as in [`query_due_events`].
pub fn list_scheduled_events(
    conn: &Connection,
    pubkey: Option<&str>,
) -> DatabaseResult<Vec<ScheduledEvent>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM scheduled_events
         WHERE ?1 IS NULL
            OR CASE WHEN json_valid(event_json)
                    THEN json_extract(event_json, '$.pubkey')
               END = ?1
         ORDER BY publish_at DESC, id DESC",
        EVENT_COLUMNS
    ))?;

    let rows = stmt.query_map(params![pubkey], read_row)?;
    readable_events(rows)
}

/// Number of events in each delivery status.
pub fn count_events_by_status(conn: &Connection) -> DatabaseResult<StatusCounts> {
    let mut stmt =
        conn.prepare_cached("SELECT status, COUNT(*) FROM scheduled_events GROUP BY status")?;

    let mut counts = StatusCounts::default();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (status, count) = row?;
        let count = count.max(0) as u64;
        match DeliveryStatus::parse(&status) {
            Some(DeliveryStatus::Scheduled) => counts.scheduled += count,
            Some(DeliveryStatus::Retrying) => counts.retrying += count,
            Some(DeliveryStatus::Sent) => counts.sent += count,
            Some(DeliveryStatus::Error) => counts.error += count,
            None => warn!(status = %status, count, "Ignoring rows with unknown status"),
        }
    }

    Ok(counts)
}

// ==========================================
// Delivery outcomes
// ==========================================

/// Record a successful attempt.
///
/// Only applies while the event is still pending and its stored attempt count
/// is `attempt - 1`. Returns whether a row was updated; a repeated call is a
/// no-op.
pub fn mark_event_sent(
    conn: &Connection,
    id: &str,
    attempt: u32,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    if attempt == 0 {
        return Ok(false);
    }

    let count = conn.execute(
        "UPDATE scheduled_events
         SET status = 'sent',
             sent = 1,
             attempt_count = ?2,
             last_error = NULL,
             last_attempt_at = ?3,
             next_attempt_at = NULL
         WHERE id = ?1
           AND status IN ('scheduled', 'retrying')
           AND attempt_count = ?2 - 1",
        params![id, attempt, format_timestamp(now)],
    )?;
    Ok(count > 0)
}

/// Record a failed attempt.
///
/// Moves the event to `error` once `attempt` reaches the policy's maximum,
/// otherwise to `retrying` with `next_attempt_at = now + next_delay(attempt)`.
/// Same guard and return value as [`mark_event_sent`].
pub fn mark_event_failed(
    conn: &Connection,
    id: &str,
    attempt: u32,
    error: &str,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    if attempt == 0 {
        return Ok(false);
    }

    let (status, next_attempt_at) = if policy.is_exhausted(attempt) {
        (DeliveryStatus::Error, None)
    } else {
        let delay = policy.next_delay(attempt);
        let delay =
            chrono::Duration::milliseconds(delay.as_millis().min(i64::MAX as u128) as i64);
        let next = now
            .checked_add_signed(delay)
            .filter(|next| is_storable(*next))
            .map(format_timestamp)
            .unwrap_or_else(|| LATEST_TIMESTAMP.to_string());
        (DeliveryStatus::Retrying, Some(next))
    };

    let count = conn.execute(
        "UPDATE scheduled_events
         SET status = ?2,
             sent = 0,
             attempt_count = ?3,
             last_error = ?4,
             last_attempt_at = ?5,
             next_attempt_at = ?6
         WHERE id = ?1
           AND status IN ('scheduled', 'retrying')
           AND attempt_count = ?3 - 1",
        params![
            id,
            status.as_str(),
            attempt,
            error,
            format_timestamp(now),
            next_attempt_at
        ],
    )?;
    Ok(count > 0)
}

/// Apply every outcome of one publish cycle in a single IMMEDIATE transaction.
///
/// Outcomes that no longer match their row (the event was reset or already
/// finished while the cycle ran) are logged and dropped. Returns the number
/// of rows updated.
pub fn apply_delivery_outcomes(
    conn: &Connection,
    outcomes: &[DeliveryOutcome],
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> DatabaseResult<usize> {
    if outcomes.is_empty() {
        return Ok(0);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut applied = 0usize;

    for outcome in outcomes {
        let updated = match outcome {
            DeliveryOutcome::Sent { id, attempt } => mark_event_sent(&tx, id, *attempt, now)?,
            DeliveryOutcome::Failed { id, attempt, error } => {
                mark_event_failed(&tx, id, *attempt, error, policy, now)?
            }
        };

        if updated {
            applied += 1;
        } else {
            warn!(
                event_id = %outcome.id(),
                attempt = outcome.attempt(),
                "Dropping stale delivery outcome"
            );
        }
    }

    tx.commit()?;
    debug!(applied, total = outcomes.len(), "Delivery outcomes committed");
    Ok(applied)
}

// ==========================================
// Operator actions
// ==========================================

/// Return an event to `scheduled` with counters and error fields cleared.
///
/// Works from any state, terminal ones included.
pub fn reset_scheduled_event(conn: &Connection, id: &str) -> DatabaseResult<()> {
    let count = conn.execute(
        "UPDATE scheduled_events
         SET status = 'scheduled',
             sent = 0,
             attempt_count = 0,
             last_error = NULL,
             last_attempt_at = NULL,
             next_attempt_at = NULL
         WHERE id = ?1",
        params![id],
    )?;

    if count == 0 {
        return Err(DatabaseError::NotFound(id.to_string()));
    }
    Ok(())
}

// ==========================================
// Row mapping
// ==========================================

/// Row id alongside the mapped row, so a failed mapping can still be named.
type ReadRow = (String, rusqlite::Result<ScheduledEvent>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<ReadRow> {
    Ok((row.get(0)?, row_to_event(row)))
}

fn readable_events(
    rows: impl Iterator<Item = rusqlite::Result<ReadRow>>,
) -> DatabaseResult<Vec<ScheduledEvent>> {
    let mut events = Vec::new();
    for row in rows {
        match row? {
            (_, Ok(event)) => events.push(event),
            (id, Err(e)) => warn!(event_id = %id, error = %e, "Skipping unreadable event row"),
        }
    }
    Ok(events)
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<ScheduledEvent> {
    Ok(ScheduledEvent {
        id: row.get(0)?,
        event_json: row.get(1)?,
        publish_at: timestamp_column(row, 2)?,
        sent: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
        status: status_column(row, 4)?,
        attempt_count: row.get(5)?,
        last_error: row.get(6)?,
        last_attempt_at: optional_timestamp_column(row, 7)?,
        next_attempt_at: optional_timestamp_column(row, 8)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(DatabaseError::InvalidData(format!("unreadable timestamp: {}", raw))),
        )
    })
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DeliveryStatus> {
    let raw: String = row.get(idx)?;
    DeliveryStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(DatabaseError::InvalidData(format!("unknown status: {}", raw))),
        )
    })
}

fn optional_timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp_column(row, idx).map(Some),
        None => Ok(None),
    }
}
