//! Transport seam used by the publish worker.

use crate::{SignedEvent, TransportResult};
use async_trait::async_trait;

/// Opens batches of relay connections.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Connect to every relay in `relays` as one batch.
    ///
    /// Fails only when the batch as a whole cannot be used. Individual relays
    /// that stay unreachable are left out of the returned session.
    async fn open(&self, relays: &[String]) -> TransportResult<Box<dyn RelaySession>>;
}

/// A set of open relay connections.
///
/// Sessions are not reused across publish cycles; `close` must be called on
/// every path once the cycle is done with it.
#[async_trait]
pub trait RelaySession: Send {
    /// URLs of the relays this session reached.
    fn relays(&self) -> Vec<String>;

    /// Send `event` to every relay in the session.
    async fn publish(&mut self, event: &SignedEvent) -> TransportResult<()>;

    /// Close every connection. Safe to call more than once.
    async fn close(&mut self);
}
