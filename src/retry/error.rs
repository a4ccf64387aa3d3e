//! Error types for retry operations.

use std::time::Duration;

use crate::context::Interrupted;

/// Error returned when all retry attempts are exhausted.
///
/// Contains the final error along with metadata about the retry sequence, so
/// callers can tell "gave up after N tries" apart from "failed immediately".
///
/// # Examples
///
/// ```rust
/// use dbretry::{with_retry, DbError, RetryContext, RetryError, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::new(2, Duration::from_millis(1));
///
/// let result = with_retry(&RetryContext::new(), &policy, || async {
///     Err::<(), _>(DbError::new("08006", "connection failure"))
/// })
/// .await;
///
/// match result {
///     Err(RetryError::Exhausted(exhausted)) => {
///         assert_eq!(exhausted.final_error.code(), "08006");
///         assert_eq!(exhausted.attempts, 3); // 1 initial + 2 retries
///     }
///     other => panic!("Expected exhaustion, got {:?}", other),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made (initial + retries).
    pub attempts: u32,
    /// Total time spent retrying.
    pub total_duration: Duration,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed after retries ({} attempts, {:?}): {}",
            self.attempts, self.total_duration, self.final_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// Why a retry invocation gave up.
///
/// Callers only ever see a success value or one of these: the untouched
/// fatal error, the exhausted-retries wrapper, or an interruption from the
/// governing [`RetryContext`](crate::RetryContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// A non-retryable error, returned from the attempt that produced it.
    Fatal(E),
    /// Every allowed attempt failed with a retryable error.
    Exhausted(RetryExhausted<E>),
    /// The context was cancelled or passed its deadline.
    Interrupted {
        /// Cancellation or deadline.
        reason: Interrupted,
        /// Attempts started before the interruption.
        attempts: u32,
        /// Error from the most recent completed attempt, if any.
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Returns true if this is a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns true if retries were exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Returns true if the context stopped the loop.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// The last error observed from an attempt, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Fatal(e) => Some(e),
            Self::Exhausted(exhausted) => Some(&exhausted.final_error),
            Self::Interrupted { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Take the last error observed from an attempt, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Fatal(e) => Some(e),
            Self::Exhausted(exhausted) => Some(exhausted.final_error),
            Self::Interrupted { last_error, .. } => last_error,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal(e) => write!(f, "{}", e),
            Self::Exhausted(exhausted) => write!(f, "{}", exhausted),
            Self::Interrupted {
                reason,
                attempts,
                last_error: Some(e),
            } => write!(f, "{} after {} attempts: {}", reason, attempts, e),
            Self::Interrupted {
                reason, attempts, ..
            } => write!(f, "{} after {} attempts", reason, attempts),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fatal(e) => e.source(),
            Self::Exhausted(exhausted) => Some(&exhausted.final_error),
            Self::Interrupted {
                last_error: Some(e),
                ..
            } => Some(e),
            Self::Interrupted { reason, .. } => Some(reason),
        }
    }
}
