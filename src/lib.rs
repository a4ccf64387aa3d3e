//! # dbretry
//!
//! Retry orchestration for operations against a PostgreSQL-compatible
//! database such as CockroachDB.
//!
//! Two things are retried: acquiring a live connection handle, and running
//! an arbitrary database operation. Both go through the same loop:
//!
//! 1. run the attempt
//! 2. on failure, classify the error once: a SQLSTATE from the transient
//!    allow-list, or a cancellation/deadline signal, is retryable; anything
//!    else is fatal and returned immediately
//! 3. back off `base_delay * 2^attempt` and try again, at most
//!    `max_retries` times
//!
//! Every attempt and every backoff sleep races a caller-supplied
//! [`RetryContext`], so cancellation and deadlines stop the loop promptly.
//!
//! ## Quick Example
//!
//! ```rust
//! use dbretry::testing::MockConnector;
//! use dbretry::{connect_with_retry, with_retry, DbError, RetryContext, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let ctx = RetryContext::new().with_timeout(Duration::from_secs(30));
//! let policy = RetryPolicy::new(5, Duration::from_millis(10));
//!
//! let connector = MockConnector::new();
//! let handle = connect_with_retry(&ctx, &connector, "postgresql://localhost", &policy)
//!     .await
//!     .unwrap();
//!
//! let inserted = with_retry(&ctx, &policy, || async { Ok::<u64, DbError>(1) })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(handle.id(), 1);
//! assert_eq!(inserted, 1);
//! # });
//! ```
//!
//! ## Features
//!
//! - `tracing` (default): log every retry, fatal stop and exhaustion
//! - `serde`: (de)serialize [`RetryPolicy`] and [`DatabaseConfig`]
//! - `postgres`: [`postgres::PgConnector`] over `tokio-postgres`

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod classify;
pub mod config;
pub mod connect;
pub mod context;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod retry;
pub mod testing;

// Re-exports
pub use classify::{
    classify, classify_chain, is_retryable, is_retryable_sql_state, sql_state, DatabaseError,
    DbError, RetryClass, RETRYABLE_SQL_STATES,
};
pub use config::{ConfigError, DatabaseConfig};
pub use connect::{connect_with_retry, connect_with_retry_notify, Connector};
pub use context::{Interrupted, RetryContext};
pub use retry::{
    with_retry, with_retry_if, with_retry_notify, RetryError, RetryEvent, RetryExhausted,
    RetryPolicy,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classify::{is_retryable, DatabaseError, DbError, RetryClass};
    pub use crate::connect::{connect_with_retry, Connector};
    pub use crate::context::{Interrupted, RetryContext};
    pub use crate::retry::{with_retry, RetryError, RetryPolicy};
}
