//! Caller-supplied cancellation and deadlines.
//!
//! A [`RetryContext`] is handed to every retry invocation. The engine races
//! each attempt and each backoff sleep against it, so a cancelled context or
//! an elapsed deadline ends the loop promptly instead of running out the
//! remaining attempts.
//!
//! # Examples
//!
//! ```
//! use dbretry::{Interrupted, RetryContext};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let ctx = RetryContext::new();
//! assert_eq!(ctx.err(), None);
//!
//! ctx.cancel();
//! assert_eq!(ctx.err(), Some(Interrupted::Cancelled));
//! assert_eq!(ctx.sleep(Duration::from_secs(60)).await, Err(Interrupted::Cancelled));
//! # });
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped admitting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Interrupted {
    /// The context was cancelled explicitly.
    #[error("context canceled")]
    Cancelled,
    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token plus optional deadline governing one or more retry
/// invocations.
///
/// Cloning is cheap and clones share the token, so cancelling any clone
/// cancels them all.
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RetryContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. a shutdown token owned by the caller.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set an absolute deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(far_future);
        self.with_deadline(deadline)
    }

    /// A context cancelled whenever this one is, which can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context is done, or `None` while it still admits work.
    pub fn err(&self) -> Option<Interrupted> {
        if self.token.is_cancelled() {
            return Some(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interrupted {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Interrupted::Cancelled,
            () = deadline => Interrupted::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the context finishes first, in which
    /// case `fut` is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        if let Some(reason) = self.err() {
            return Err(reason);
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration`, waking early if the context finishes.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.run(tokio::time::sleep(duration)).await
    }
}

// Roughly 30 years out, the same horizon tokio uses for "never".
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
