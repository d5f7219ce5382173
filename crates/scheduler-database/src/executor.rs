//! Async SQLite executor using a dedicated background thread.
//!
//! - Uses a single dedicated thread for all SQLite operations
//! - Sends queries through a channel (non-blocking from caller's perspective)
//! - Keeps the Tokio runtime free for relay I/O
//!
//! Several processes may open the same file (the publisher and short-lived
//! CLI commands). WAL mode gives readers a snapshot while a writer holds the
//! lock, and `busy_timeout` makes a contended writer wait instead of failing.
//!
//! # Example
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//!
//! let due = db.call(move |conn| queries::query_due_events(conn, now)).await?;
//!
//! // WRONG: relay I/O inside call() blocks every other query
//! // db.call(|conn| { publish_to_relays(...) }).await;
//! ```

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Milliseconds a writer waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => {
            DatabaseError::Connection("Connection closed".to_string())
        }
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
///
/// Cloning is cheap; every clone talks to the same thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database at the given path.
    ///
    /// This will:
    /// - Create the database file (and its directory) if missing
    /// - Enable WAL mode and the busy timeout
    /// - Run any pending migrations
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening scheduler database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn,
            path: path_str,
        };
        db.initialize().await?;

        info!(path = %db.path, "Scheduler database ready");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn,
            path: ":memory:".to_string(),
        };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| {
            conn.execute_batch(&format!(
                "
                PRAGMA busy_timeout = {};
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                ",
                BUSY_TIMEOUT_MS
            ))
        })
        .await?;

        self.call(|conn| migrations::run_migrations(conn)).await
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread. The caller's task is
    /// parked (not blocked) until the result is ready. Only SQL and light row
    /// mapping belong here.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our DatabaseResult rides inside tokio_rusqlite's Ok variant so typed
        // errors such as Conflict survive the trip back.
        let outer_result = self
            .conn
            .call(move |conn| {
                let inner_result = f(conn);
                Ok(inner_result)
            })
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure that returns a rusqlite::Result.
    pub async fn call_sqlite<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the database is healthy by executing a simple query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("SELECT 1")).await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the database connection.
    ///
    /// Pending operations finish first, then the executor thread stops.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{queries, DeliveryStatus, NewScheduledEvent};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn new_event(id: &str) -> NewScheduledEvent {
        NewScheduledEvent {
            id: id.to_string(),
            event_json: format!("{{\"id\":\"{}\"}}", id),
            publish_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_async_database_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("scheduler.sqlite");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        assert!(db.health_check().await.is_ok());
        assert!(db_path.exists());
        assert_eq!(db.path(), db_path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_typed_errors_cross_the_executor() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();

        let event = new_event("ev-1");
        let first = event.clone();
        db.call(move |conn| queries::insert_scheduled_event(conn, &first, Utc::now()))
            .await
            .unwrap();

        let err = db
            .call(move |conn| queries::insert_scheduled_event(conn, &event, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("scheduler.sqlite");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        let event = new_event("persisted");
        db.call(move |conn| queries::insert_scheduled_event(conn, &event, Utc::now()))
            .await
            .unwrap();
        db.close().await.unwrap();

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        let stored = db
            .call(|conn| queries::get_scheduled_event(conn, "persisted"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DeliveryStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_yield_one_conflict() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("race.sqlite");

        // Separate connections, as separate processes would have.
        let a = AsyncDatabase::open(&db_path).await.unwrap();
        let b = AsyncDatabase::open(&db_path).await.unwrap();

        let mut handles = vec![];
        for db in [a.clone(), b.clone(), a, b] {
            let event = new_event("contested");
            handles.push(tokio::spawn(async move {
                db.call(move |conn| queries::insert_scheduled_event(conn, &event, Utc::now()))
                    .await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DatabaseError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 3);
    }

    #[tokio::test]
    async fn test_concurrent_first_opens_all_succeed() {
        for round in 0..10 {
            let dir = tempdir().unwrap();
            let db_path = dir.path().join(format!("fresh-{}.sqlite", round));

            let mut handles = vec![];
            for _ in 0..4 {
                let path = db_path.clone();
                handles.push(tokio::spawn(async move { AsyncDatabase::open(&path).await }));
            }

            let mut opened = vec![];
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(db) => opened.push(db),
                    Err(e) => panic!("round {}: open failed: {}", round, e),
                }
            }

            let (steps, version): (i64, i32) = opened[0]
                .call_sqlite(|conn| {
                    conn.query_row("SELECT COUNT(*), MAX(version) FROM migrations", [], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })
                })
                .await
                .unwrap();
            assert_eq!(version, migrations::CURRENT_VERSION);
            assert_eq!(steps, migrations::CURRENT_VERSION as i64);
        }
    }
}
