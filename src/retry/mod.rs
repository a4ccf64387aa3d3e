//! Retry policies, the retry loop and its error types.
//!
//! - [`RetryPolicy`] is pure data: how many retries, which backoff base,
//!   an optional cap. It never sleeps by itself.
//! - [`with_retry`] and friends run a caller-supplied operation under a
//!   policy, classifying each failure once and backing off exponentially.
//! - [`RetryError`] tells the caller how the loop ended.
//!
//! # Quick Start
//!
//! ```rust
//! use dbretry::{with_retry, DbError, RetryContext, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::new(3, Duration::from_millis(100));
//!
//! let value = with_retry(&RetryContext::new(), &policy, || async { Ok::<_, DbError>(42) })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(value, 42);
//! # });
//! ```
//!
//! # Backoff
//!
//! The delay after failed attempt `n` (0-indexed) is `base_delay * 2^n`:
//! 100ms, 200ms, 400ms, ... for a 100ms base. Growth is unbounded unless
//! [`RetryPolicy::with_max_delay`] sets a cap.
//!
//! # Error Types
//!
//! - [`RetryError::Fatal`]: the first non-retryable error, untouched
//! - [`RetryError::Exhausted`]: wraps the last retryable error in [`RetryExhausted`]
//! - [`RetryError::Interrupted`]: the [`RetryContext`](crate::RetryContext) ended the loop

mod error;
pub(crate) mod executor;
mod policy;

pub use error::{RetryError, RetryExhausted};
pub use executor::{with_retry, with_retry_if, with_retry_notify};
pub use policy::{RetryEvent, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
