//! Test harness for publish worker tests.
//!
//! Provides:
//! - ScriptedTransport: an in-memory `RelayTransport` whose behaviour each
//!   test sets up front, and which records what the worker did with it
//! - TestHarness: a `PublishWorker` over a temporary on-disk database

use crate::{PublishWorker, PublishWorkerConfig};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use nostr_relay_transport::{
    RelaySession, RelayTransport, SignedEvent, TransportError, TransportResult,
};
use relay_set::{RelaySource, StaticRelays};
use scheduler_config_and_utils::RetryPolicy;
use scheduler_database::{queries, AsyncDatabase, NewScheduledEvent, ScheduledEvent};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Fixed reference time for deterministic cycles.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// `t0()` plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + ChronoDuration::seconds(secs)
}

/// Signed event JSON for `id`.
pub fn signed_event_json(id: &str) -> String {
    serde_json::json!({
        "id": id,
        "pubkey": "f".repeat(64),
        "created_at": 1_735_689_600,
        "kind": 1,
        "tags": [["client", "schdlstr"]],
        "content": format!("scheduled note {}", id),
        "sig": "a".repeat(128),
    })
    .to_string()
}

#[derive(Default)]
struct TransportState {
    opens: Vec<Vec<String>>,
    attempted: Vec<String>,
    closes: usize,
    open_failure: Option<String>,
    panics_on_open: usize,
    failing_events: HashSet<String>,
    publish_delay: Duration,
    reset_during_publish: Option<(AsyncDatabase, String)>,
}

/// In-memory relay transport with scripted behaviour.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `open` fail with `error`.
    pub fn fail_open(&self, error: &str) {
        self.state.lock().unwrap().open_failure = Some(error.to_string());
    }

    /// Let `open` succeed again.
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.open_failure = None;
        state.failing_events.clear();
    }

    /// Panic inside the next `count` opens.
    pub fn panic_on_open(&self, count: usize) {
        self.state.lock().unwrap().panics_on_open = count;
    }

    /// Make publishing `event_id` fail.
    pub fn fail_event(&self, event_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_events
            .insert(event_id.to_string());
    }

    /// Sleep this long inside every publish.
    pub fn delay_publish(&self, delay: Duration) {
        self.state.lock().unwrap().publish_delay = delay;
    }

    /// Reset `event_id` in `db` while the next publish is in flight.
    pub fn reset_during_publish(&self, db: AsyncDatabase, event_id: &str) {
        self.state.lock().unwrap().reset_during_publish = Some((db, event_id.to_string()));
    }

    /// Relay lists passed to each `open`.
    pub fn opens(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().opens.clone()
    }

    /// Event ids handed to `publish`, in call order.
    pub fn attempted(&self) -> Vec<String> {
        self.state.lock().unwrap().attempted.clone()
    }

    /// Number of sessions closed.
    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl RelayTransport for ScriptedTransport {
    async fn open(&self, relays: &[String]) -> TransportResult<Box<dyn RelaySession>> {
        let failure = {
            let mut state = self.state.lock().unwrap();
            state.opens.push(relays.to_vec());
            if state.panics_on_open > 0 {
                state.panics_on_open -= 1;
                drop(state);
                panic!("scripted transport panic");
            }
            state.open_failure.clone()
        };

        if let Some(error) = failure {
            return Err(TransportError::Connection(error));
        }

        Ok(Box::new(ScriptedSession {
            relays: relays.to_vec(),
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    relays: Vec<String>,
    state: Arc<Mutex<TransportState>>,
    closed: bool,
}

#[async_trait]
impl RelaySession for ScriptedSession {
    fn relays(&self) -> Vec<String> {
        self.relays.clone()
    }

    async fn publish(&mut self, event: &SignedEvent) -> TransportResult<()> {
        let (delay, reset) = {
            let mut state = self.state.lock().unwrap();
            (state.publish_delay, state.reset_during_publish.take())
        };

        if let Some((db, id)) = reset {
            db.call(move |conn| queries::reset_scheduled_event(conn, &id))
                .await
                .unwrap();
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.attempted.push(event.id.clone());
        if state.failing_events.contains(&event.id) {
            return Err(TransportError::Publish(format!(
                "{}: connection reset",
                self.relays.join(", ")
            )));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().closes += 1;
        }
    }
}

/// Worker over a fresh database and a scripted transport.
pub struct TestHarness {
    pub db: AsyncDatabase,
    pub transport: ScriptedTransport,
    pub worker: PublishWorker,
    dir: TempDir,
}

impl TestHarness {
    /// Worker publishing to `relays`, no settle delay, default retry policy.
    pub async fn new(relays: &[&str]) -> Self {
        Self::with_config(relays, fast_config()).await
    }

    pub async fn with_config(relays: &[&str], config: PublishWorkerConfig) -> Self {
        let relays = StaticRelays(relays.iter().map(|r| r.to_string()).collect());
        Self::with_relay_source(Arc::new(relays), config).await
    }

    pub async fn with_relay_source(
        relays: Arc<dyn RelaySource>,
        config: PublishWorkerConfig,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let db = AsyncDatabase::open(&dir.path().join("scheduler.sqlite"))
            .await
            .unwrap();
        let transport = ScriptedTransport::new();
        let worker = PublishWorker::new(
            config,
            db.clone(),
            relays,
            Arc::new(transport.clone()),
        );

        Self {
            db,
            transport,
            worker,
            dir,
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Schedule a valid signed event for `publish_at`.
    pub async fn submit_at(&self, id: &str, publish_at: DateTime<Utc>) {
        self.submit_raw(id, &signed_event_json(id), publish_at).await;
    }

    /// Schedule an arbitrary payload for `publish_at`.
    pub async fn submit_raw(&self, id: &str, event_json: &str, publish_at: DateTime<Utc>) {
        let event = NewScheduledEvent {
            id: id.to_string(),
            event_json: event_json.to_string(),
            publish_at,
        };
        let submitted_at = publish_at - ChronoDuration::seconds(1);
        self.db
            .call(move |conn| queries::insert_scheduled_event(conn, &event, submitted_at))
            .await
            .unwrap();
    }

    pub async fn get(&self, id: &str) -> ScheduledEvent {
        let id = id.to_string();
        self.db
            .call(move |conn| queries::get_scheduled_event(conn, &id))
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn reset(&self, id: &str) {
        let id = id.to_string();
        self.db
            .call(move |conn| queries::reset_scheduled_event(conn, &id))
            .await
            .unwrap();
    }
}

/// Default policy, no settle delay, short interval.
pub fn fast_config() -> PublishWorkerConfig {
    PublishWorkerConfig {
        policy: RetryPolicy::default(),
        interval: Duration::from_millis(20),
        settle_delay: Duration::ZERO,
    }
}
