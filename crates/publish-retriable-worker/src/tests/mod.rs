//! Integration tests for the publish worker.
//!
//! - `harness.rs`        - Scripted relay transport and a worker over a temp database
//! - `delivery.rs`       - Successful cycles, ordering, per-event independence
//! - `failures.rs`       - Empty relay list, unreachable relays, bad payloads
//! - `exhaustion.rs`     - Backoff schedule, terminal error, operator reset
//! - `invariants.rs`     - Terminal states, stale outcomes, crash safety
//! - `scheduler_loop.rs` - Ticker, shutdown, cycle isolation

mod delivery;
pub(crate) mod harness;
