//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table. Each
//! one runs inside its own transaction together with its bookkeeping row.

use crate::models::{format_timestamp, parse_timestamp};
use crate::{DatabaseError, DatabaseResult};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

const UNIX_EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00.000000Z";

/// One schema step.
type Migration = (i32, &'static str, fn(&Connection) -> DatabaseResult<()>);

const MIGRATIONS: [Migration; 3] = [
    (1, "scheduled_events_base", migrate_v1_base_table),
    (2, "delivery_state", migrate_v2_delivery_state),
    (3, "normalize_timestamps", migrate_v3_normalize_timestamps),
];

/// Run all pending migrations.
///
/// Safe to call from several processes at once: every step takes the write
/// lock first and re-reads the applied version under it, so each step runs
/// exactly once and later openers wait on `busy_timeout` instead of failing.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    let current_version = applied_version(&tx)?;
    tx.commit()?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    let mut applied = 0usize;
    for (version, name, migrate) in MIGRATIONS {
        if version > current_version && apply(conn, version, name, migrate)? {
            applied += 1;
        }
    }

    info!(applied, "Migrations complete");
    Ok(())
}

fn applied_version(conn: &Connection) -> DatabaseResult<i32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply one step unless another connection already did. Returns whether it ran.
fn apply(
    conn: &Connection,
    version: i32,
    name: &str,
    migrate: fn(&Connection) -> DatabaseResult<()>,
) -> DatabaseResult<bool> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    if applied_version(&tx)? >= version {
        debug!(version, name, "Migration already applied elsewhere");
        return Ok(false);
    }

    info!(version, name, "Applying migration");
    migrate(&tx)
        .map_err(|e| DatabaseError::Migration(format!("v{} {}: {}", version, name, e)))?;
    tx.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        params![version, name],
    )?;
    tx.commit()?;

    debug!(version, name, "Migration applied");
    Ok(true)
}

/// V1: the original table shape, so databases written by older releases
/// are picked up as-is.
fn migrate_v1_base_table(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_events (
            id TEXT PRIMARY KEY,
            event_json TEXT NOT NULL,
            publish_at TEXT NOT NULL,
            sent INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}

/// V2: delivery state columns and the indexes used by the due-set query.
///
/// Older releases added some of these columns at start-up, so each column is
/// only added when missing.
fn migrate_v2_delivery_state(conn: &Connection) -> DatabaseResult<()> {
    const COLUMNS: [(&str, &str); 5] = [
        ("status", "TEXT NOT NULL DEFAULT 'scheduled'"),
        ("attempt_count", "INTEGER NOT NULL DEFAULT 0"),
        ("last_error", "TEXT"),
        ("last_attempt_at", "TEXT"),
        ("next_attempt_at", "TEXT"),
    ];

    let existing = table_columns(conn, "scheduled_events")?;
    for (column, definition) in COLUMNS {
        if existing.iter().any(|c| c == column) {
            debug!(column, "Column already present");
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE scheduled_events ADD COLUMN {} {};",
            column, definition
        ))?;
    }

    conn.execute_batch(
        "
        UPDATE scheduled_events
           SET sent = 0
         WHERE sent IS NULL;

        UPDATE scheduled_events
           SET status = 'sent',
               next_attempt_at = NULL,
               last_error = NULL
         WHERE sent = 1;

        UPDATE scheduled_events
           SET attempt_count = 1
         WHERE status = 'sent' AND attempt_count < 1;

        UPDATE scheduled_events
           SET next_attempt_at = publish_at
         WHERE status = 'retrying' AND next_attempt_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_scheduled_events_status_publish_at
            ON scheduled_events(status, publish_at);
        CREATE INDEX IF NOT EXISTS idx_scheduled_events_next_attempt_at
            ON scheduled_events(next_attempt_at);
        ",
    )?;
    Ok(())
}

/// V3: rewrite stored timestamps into the canonical encoding.
///
/// Rows whose `publish_at` cannot be read at all are parked in `error` with
/// the original value kept in `last_error`.
fn migrate_v3_normalize_timestamps(conn: &Connection) -> DatabaseResult<()> {
    let rows: Vec<(String, String, Option<String>, Option<String>)> = {
        let mut stmt = conn.prepare(
            "SELECT id, publish_at, last_attempt_at, next_attempt_at FROM scheduled_events",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let canonical = |value: Option<String>| {
        value
            .as_deref()
            .and_then(parse_timestamp)
            .map(format_timestamp)
    };

    let mut rewritten = 0usize;
    for (id, publish_at, last_attempt_at, next_attempt_at) in rows {
        match parse_timestamp(&publish_at) {
            Some(ts) => {
                conn.execute(
                    "UPDATE scheduled_events
                        SET publish_at = ?1, last_attempt_at = ?2, next_attempt_at = ?3
                      WHERE id = ?4",
                    params![
                        format_timestamp(ts),
                        canonical(last_attempt_at),
                        canonical(next_attempt_at),
                        id
                    ],
                )?;
                rewritten += 1;
            }
            None => {
                warn!(
                    event_id = %id,
                    publish_at = %publish_at,
                    "Unreadable publish_at, parking event"
                );
                conn.execute(
                    "UPDATE scheduled_events
                        SET publish_at = ?1,
                            status = 'error',
                            sent = 0,
                            next_attempt_at = NULL,
                            last_error = ?2
                      WHERE id = ?3",
                    params![
                        UNIX_EPOCH_TIMESTAMP,
                        format!("unreadable publish_at: {}", publish_at),
                        id
                    ],
                )?;
            }
        }
    }

    debug!(rewritten, "Timestamps normalized");
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> DatabaseResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}
