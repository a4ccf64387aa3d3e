//! The retry loop.
//!
//! Every public entry point funnels into [`drive`], which owns the attempt
//! counter, the single classification per failure, the backoff sleep and
//! the retry diagnostics. Callers supply an attempt factory; each call
//! produces a fresh future, since a failed attempt is redone from scratch
//! rather than resumed.

use std::fmt;
use std::future::Future;

use tokio::time::Instant;

use crate::classify::{classify, DatabaseError, RetryClass};
use crate::context::{Interrupted, RetryContext};
use crate::retry::{RetryError, RetryEvent, RetryExhausted, RetryPolicy};

/// Retry `operation` while it fails with retryable errors.
///
/// `operation` is called once per attempt and must build a new future each
/// time. Errors are classified with [`classify`]: a fatal error is returned
/// unchanged as [`RetryError::Fatal`] from the attempt that produced it;
/// retryable errors back off `base_delay * 2^attempt` and try again until
/// `max_retries` retries have been spent.
///
/// # Example
///
/// ```rust
/// use dbretry::{sql_state, with_retry, DbError, RetryContext, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let calls = AtomicU32::new(0);
/// let policy = RetryPolicy::new(3, Duration::from_millis(1));
///
/// let rows = with_retry(&RetryContext::new(), &policy, || async {
///     if calls.fetch_add(1, Ordering::SeqCst) == 0 {
///         Err(DbError::new(sql_state::CONNECTION_FAILURE, "connection reset"))
///     } else {
///         Ok(1u64)
///     }
/// })
/// .await;
///
/// assert_eq!(rows, Ok(1));
/// assert_eq!(calls.load(Ordering::SeqCst), 2);
/// # });
/// ```
pub async fn with_retry<T, E, F, Fut>(
    ctx: &RetryContext,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    E: DatabaseError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_notify(ctx, policy, operation, |_: &RetryEvent<'_, E>| {}).await
}

/// Like [`with_retry`], calling `on_retry` before every backoff sleep.
///
/// The hook is synchronous and should not block; use it for metrics or
/// extra logging.
pub async fn with_retry_notify<T, E, F, Fut, H>(
    ctx: &RetryContext,
    policy: &RetryPolicy,
    mut operation: F,
    on_retry: H,
) -> Result<T, RetryError<E>>
where
    E: DatabaseError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&RetryEvent<'_, E>),
{
    drive(
        ctx,
        policy,
        Operation::Query,
        move || ctx.run(operation()),
        |err: &E| classify(err),
        on_retry,
    )
    .await
}

/// Like [`with_retry`], with a caller-supplied classifier.
///
/// Useful for error types that do not implement [`DatabaseError`], or for
/// narrowing the default allow-list.
pub async fn with_retry_if<T, E, F, Fut, P>(
    ctx: &RetryContext,
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    drive(
        ctx,
        policy,
        Operation::Query,
        move || ctx.run(operation()),
        |err: &E| {
            if should_retry(err) {
                RetryClass::Retryable
            } else {
                RetryClass::Fatal
            }
        },
        |_: &RetryEvent<'_, E>| {},
    )
    .await
}

/// What is being retried; only affects diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Connect,
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("database connection"),
            Self::Query => f.write_str("operation"),
        }
    }
}

/// Run attempts until one succeeds, one fails fatally, the policy runs out,
/// or `ctx` finishes.
///
/// `attempt` yields `Err(Interrupted)` when the context cut the attempt
/// short; that ends the loop without classification since no further
/// attempt could run under the same context.
pub(crate) async fn drive<T, E, A, Fut, C, H>(
    ctx: &RetryContext,
    policy: &RetryPolicy,
    operation: Operation,
    mut attempt: A,
    classify_error: C,
    mut on_retry: H,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<Result<T, E>, Interrupted>>,
    C: Fn(&E) -> RetryClass,
    H: FnMut(&RetryEvent<'_, E>),
{
    #[cfg(not(feature = "tracing"))]
    let _ = operation;

    let start = Instant::now();
    let mut index = 0u32;
    let mut last_error: Option<E> = None;

    loop {
        if let Some(reason) = ctx.err() {
            return Err(RetryError::Interrupted {
                reason,
                attempts: index,
                last_error,
            });
        }

        let error = match attempt().await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(reason) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%operation, attempt = index + 1, %reason, "retry loop interrupted");
                return Err(RetryError::Interrupted {
                    reason,
                    attempts: index + 1,
                    last_error,
                });
            }
        };

        if classify_error(&error) == RetryClass::Fatal {
            #[cfg(feature = "tracing")]
            tracing::debug!(%operation, attempt = index + 1, %error, "non-retryable error");
            return Err(RetryError::Fatal(error));
        }

        let Some(delay) = policy.delay_for_attempt(index) else {
            let attempts = index + 1;
            #[cfg(feature = "tracing")]
            tracing::error!(%operation, attempts, %error, "{} failed after retries", operation);
            return Err(RetryError::Exhausted(RetryExhausted::new(
                error,
                attempts,
                start.elapsed(),
            )));
        };

        let event = RetryEvent {
            attempt: index + 1,
            error: &error,
            delay,
            elapsed: start.elapsed(),
        };
        #[cfg(feature = "tracing")]
        tracing::warn!(
            attempt = event.attempt,
            max_retries = policy.max_retries(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying {} in {:?} (attempt {})",
            operation,
            delay,
            event.attempt,
        );
        on_retry(&event);

        if let Err(reason) = ctx.sleep(delay).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(%operation, attempt = index + 1, %reason, "backoff interrupted");
            return Err(RetryError::Interrupted {
                reason,
                attempts: index + 1,
                last_error: Some(error),
            });
        }

        last_error = Some(error);
        index += 1;
    }
}
