//! SQLite storage for scheduled events.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Versioned schema migrations
//! - Model types for the `scheduled_events` table
//! - Query helpers for submission, due-set selection and delivery outcomes
//!
//! # Architecture
//!
//! `AsyncDatabase` runs every statement on one background thread. Callers
//! pass plain query functions from [`queries`]:
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let due = db.call(move |conn| queries::query_due_events(conn, now)).await?;
//! ```
//!
//! Only SQL belongs inside `db.call()`. Network I/O and relay settle delays
//! must happen outside of it.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::run_migrations;
pub use models::*;
