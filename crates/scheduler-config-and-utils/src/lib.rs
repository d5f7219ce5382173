//! Configuration, paths, retry policy, and logging bootstrap for schdlstr.

mod backoff;
mod config;
mod error;
mod logging;
mod paths;

pub use backoff::RetryPolicy;
pub use config::{
    Config, DEFAULT_LOG_LEVEL, DEFAULT_MAX_PUBLISH_ATTEMPTS, DEFAULT_PUBLISHER_INTERVAL_SECONDS,
    DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS, DEFAULT_RELAY_SETTLE_MILLIS, DEFAULT_RETRY_BASE_SECONDS,
    DEFAULT_RETRY_MAX_SECONDS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
