//! # PublishWorker: scheduled event delivery
//!
//! The worker that moves scheduled events out to nostr relays with bounded
//! retries and exponential backoff.
//!
//! ## Overview
//!
//! - **[`PublishWorker::run_cycle`]**: one pass over the due set. Loads due
//!   events, opens one relay batch, publishes each event in turn, then
//!   commits every outcome in a single transaction.
//!
//! - **[`PublishWorker::run`]**: the scheduler loop. Runs a cycle on every
//!   tick until shutdown; a failing or panicking cycle is logged and the loop
//!   keeps going.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   due set    ┌───────────────┐  EVENT frames  ┌────────┐
//! │    SQLite    │─────────────▶│ PublishWorker │───────────────▶│ Relays │
//! │ (scheduled_  │◀─────────────│   (1 cycle)   │                └────────┘
//! │   events)    │   outcomes   └───────┬───────┘
//! └──────────────┘  (1 tx/cycle)        │ relays.json
//!                                       ▼
//!                               ┌───────────────┐
//!                               │  RelaySource  │
//!                               └───────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Fresh connections per cycle**: the relay batch is opened at the start
//!   of a cycle and closed before it ends, on every path.
//!
//! - **Independent outcomes**: one event failing never skips another.
//!
//! - **Atomic commit**: outcomes are written together, so a crash mid-cycle
//!   leaves the whole batch untouched and it is retried.
//!
//! - **Reset wins**: an outcome only lands if the row still carries the
//!   attempt count the cycle read. An operator reset during a cycle is kept.
//!
//! ## Example
//!
//! ```ignore
//! let worker = PublishWorker::new(
//!     PublishWorkerConfig::from_config(&config),
//!     db,
//!     Arc::new(RelaySet::new(config.relays_path(&paths))),
//!     Arc::new(WebSocketTransport::new(config.relay_connect_timeout())),
//! );
//! let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
//! let handle = worker.spawn(stop_rx);
//! // ...
//! let _ = stop_tx.send(());
//! handle.await?;
//! ```

mod error;

pub use error::{WorkerError, WorkerResult};

use chrono::{DateTime, Utc};
use nostr_relay_transport::{RelaySession, RelayTransport, SignedEvent};
use relay_set::RelaySource;
use scheduler_config_and_utils::{Config, RetryPolicy};
use scheduler_database::{queries, AsyncDatabase, DeliveryOutcome, ScheduledEvent};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Error recorded when the relay list is empty.
pub const NO_RELAYS_ERROR: &str = "No relays configured";

/// Configuration for PublishWorker timing and retry behavior.
///
/// # Fields
///
/// - `policy`: attempt budget and backoff (default: 5 attempts, 30s doubling to 1800s)
/// - `interval`: time between cycles (default: 30s)
/// - `settle_delay`: pause between opening relays and the first publish (default: 1.25s)
#[derive(Debug, Clone)]
pub struct PublishWorkerConfig {
    pub policy: RetryPolicy,
    pub interval: Duration,
    pub settle_delay: Duration,
}

impl Default for PublishWorkerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PublishWorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.retry_policy(),
            interval: config.publisher_interval(),
            settle_delay: config.relay_settle_delay(),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events that were due when the cycle started.
    pub due: usize,
    /// Events the relays accepted.
    pub sent: usize,
    /// Events whose attempt failed.
    pub failed: usize,
    /// Outcomes that were committed; lower than `due` when some went stale.
    pub applied: usize,
}

/// Publish worker.
///
/// Cheap to clone; clones share the database handle, relay source and
/// transport.
#[derive(Clone)]
pub struct PublishWorker {
    config: PublishWorkerConfig,
    db: AsyncDatabase,
    relays: Arc<dyn RelaySource>,
    transport: Arc<dyn RelayTransport>,
}

impl PublishWorker {
    pub fn new(
        config: PublishWorkerConfig,
        db: AsyncDatabase,
        relays: Arc<dyn RelaySource>,
        transport: Arc<dyn RelayTransport>,
    ) -> Self {
        Self {
            config,
            db,
            relays,
            transport,
        }
    }

    pub fn config(&self) -> &PublishWorkerConfig {
        &self.config
    }

    /// Run one publish cycle as of `now`.
    ///
    /// Only database failures abort the cycle. Relay trouble of any kind is
    /// recorded against the events it affected.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> WorkerResult<CycleReport> {
        let due = self
            .db
            .call(move |conn| queries::query_due_events(conn, now))
            .await?;

        if due.is_empty() {
            info!("No pending events to publish");
            return Ok(CycleReport::default());
        }

        let relays = self.relays.load();
        debug!(due = due.len(), relay_count = relays.len(), "Publish cycle started");

        let outcomes = if relays.is_empty() {
            warn!(due = due.len(), "No relays configured, failing due events");
            fail_all(&due, NO_RELAYS_ERROR)
        } else {
            match self.transport.open(&relays).await {
                Ok(mut session) => {
                    let outcomes = self.publish_due(session.as_mut(), &due).await;
                    session.close().await;
                    outcomes
                }
                Err(e) => {
                    error!(error = %e, relay_count = relays.len(), "Failed to connect to relays");
                    fail_all(&due, &e.to_string())
                }
            }
        };

        let mut report = CycleReport {
            due: due.len(),
            ..CycleReport::default()
        };
        for outcome in &outcomes {
            match outcome {
                DeliveryOutcome::Sent { .. } => report.sent += 1,
                DeliveryOutcome::Failed { .. } => report.failed += 1,
            }
        }

        let policy = self.config.policy;
        report.applied = self
            .db
            .call(move |conn| queries::apply_delivery_outcomes(conn, &outcomes, &policy, now))
            .await?;

        info!(
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            applied = report.applied,
            "Publish cycle complete"
        );
        Ok(report)
    }

    /// Publish each due event in order; every event gets exactly one outcome.
    async fn publish_due(
        &self,
        session: &mut dyn RelaySession,
        due: &[ScheduledEvent],
    ) -> Vec<DeliveryOutcome> {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let max_attempts = self.config.policy.max_attempts;
        let mut outcomes = Vec::with_capacity(due.len());

        for event in due {
            let attempt = event.next_attempt();
            let result = match SignedEvent::from_json(&event.event_json) {
                Ok(signed) => session.publish(&signed).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(event_id = %event.id, attempt, "Published event");
                    outcomes.push(DeliveryOutcome::Sent {
                        id: event.id.clone(),
                        attempt,
                    });
                }
                Err(e) => {
                    error!(
                        event_id = %event.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Failed to publish event"
                    );
                    outcomes.push(DeliveryOutcome::Failed {
                        id: event.id.clone(),
                        attempt,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcomes
    }

    /// Run cycles on a fixed interval until `shutdown` fires (or its sender
    /// is dropped).
    ///
    /// Shutdown is only observed between cycles, so a running cycle always
    /// reaches its commit. Each cycle runs as its own task; an error or panic
    /// inside it is logged and the next tick proceeds normally.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            max_attempts = self.config.policy.max_attempts,
            "Publish worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let worker = self.clone();
            let cycle = tokio::spawn(async move { worker.run_cycle(Utc::now()).await });

            match cycle.await {
                Ok(Ok(report)) => {
                    debug!(
                        due = report.due,
                        sent = report.sent,
                        failed = report.failed,
                        "Cycle finished"
                    );
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Publish cycle failed");
                }
                Err(e) => {
                    error!(error = %e, "Publish cycle aborted");
                }
            }
        }

        info!("Publish worker stopped");
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn spawn(self, shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

fn fail_all(due: &[ScheduledEvent], error: &str) -> Vec<DeliveryOutcome> {
    due.iter()
        .map(|event| DeliveryOutcome::Failed {
            id: event.id.clone(),
            attempt: event.next_attempt(),
            error: error.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests;
