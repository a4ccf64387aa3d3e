//! Testing utilities for code built on the retry engine.
//!
//! [`MockConnector`] plays a scripted sequence of open/ping outcomes and
//! records every handle it opens, pings and closes, so tests can check that
//! no handle leaks across retries. The assertion macros match on
//! [`RetryError`](crate::RetryError) variants.
//!
//! # Examples
//!
//! ```rust
//! use dbretry::testing::MockConnector;
//! use dbretry::{assert_fatal, connect_with_retry, DbError, RetryContext, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let connector = MockConnector::new().then_open_fails(DbError::new("28P01", "bad password"));
//!
//! let result = connect_with_retry(
//!     &RetryContext::new(),
//!     &connector,
//!     "postgresql://localhost",
//!     &RetryPolicy::new(5, Duration::from_millis(1)),
//! )
//! .await;
//!
//! let err = assert_fatal!(result);
//! assert_eq!(err.code(), "28P01");
//! assert_eq!(connector.open_calls(), 1);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::classify::DbError;
use crate::connect::Connector;

/// A handle produced by [`MockConnector`].
#[derive(Debug, PartialEq, Eq)]
pub struct MockHandle {
    id: u32,
}

impl MockHandle {
    /// 1-based position of this handle among all handles the connector opened.
    pub fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug)]
enum Step {
    OpenFails(DbError),
    PingFails(DbError),
    OpenHangs,
    PingHangs,
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Step>,
    open_calls: u32,
    opened: u32,
    pings: u32,
    failed_pings: Vec<u32>,
    closed: Vec<u32>,
    targets: Vec<String>,
}

impl State {
    fn open_handle(&mut self) -> MockHandle {
        self.opened += 1;
        MockHandle { id: self.opened }
    }
}

/// A [`Connector`] driven by a script of failures.
///
/// Each `then_*` call queues the outcome of one attempt. Once the script is
/// empty every attempt opens and pings successfully.
#[derive(Debug, Default)]
pub struct MockConnector {
    state: Mutex<State>,
}

impl MockConnector {
    /// A connector whose attempts all succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an attempt whose open fails with `err`.
    pub fn then_open_fails(self, err: DbError) -> Self {
        self.push(Step::OpenFails(err))
    }

    /// Queue an attempt that opens a handle whose ping fails with `err`.
    pub fn then_ping_fails(self, err: DbError) -> Self {
        self.push(Step::PingFails(err))
    }

    /// Queue `n` attempts whose open fails with a clone of `err`.
    pub fn then_open_fails_times(self, n: u32, err: DbError) -> Self {
        (0..n).fold(self, |connector, _| connector.then_open_fails(err.clone()))
    }

    /// Queue an attempt whose open never completes.
    pub fn then_open_hangs(self) -> Self {
        self.push(Step::OpenHangs)
    }

    /// Queue an attempt that opens a handle whose ping never completes.
    pub fn then_ping_hangs(self) -> Self {
        self.push(Step::PingHangs)
    }

    /// Number of times `open` was called.
    pub fn open_calls(&self) -> u32 {
        self.lock().open_calls
    }

    /// Number of handles successfully opened.
    pub fn opened(&self) -> u32 {
        self.lock().opened
    }

    /// Number of times `ping` was called.
    pub fn pings(&self) -> u32 {
        self.lock().pings
    }

    /// Number of handles closed.
    pub fn closed(&self) -> u32 {
        self.closed_ids().len() as u32
    }

    /// Ids of closed handles, in closing order.
    pub fn closed_ids(&self) -> Vec<u32> {
        self.lock().closed.clone()
    }

    /// Ids of handles whose ping returned an error.
    pub fn failed_ping_ids(&self) -> Vec<u32> {
        self.lock().failed_pings.clone()
    }

    /// Targets passed to `open`, in call order.
    pub fn targets(&self) -> Vec<String> {
        self.lock().targets.clone()
    }

    fn push(self, step: Step) -> Self {
        self.lock().script.push_back(step);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    type Handle = MockHandle;
    type Error = DbError;

    fn open<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<MockHandle, DbError>> {
        let mut state = self.lock();
        state.open_calls += 1;
        state.targets.push(target.to_string());

        match state.script.pop_front() {
            Some(Step::OpenFails(err)) => futures::future::ready(Err(err)).boxed(),
            Some(Step::OpenHangs) => futures::future::pending().boxed(),
            Some(other) => {
                state.script.push_front(other);
                futures::future::ready(Ok(state.open_handle())).boxed()
            }
            None => futures::future::ready(Ok(state.open_handle())).boxed(),
        }
    }

    fn ping<'a>(&'a self, handle: &'a MockHandle) -> BoxFuture<'a, Result<(), DbError>> {
        let mut state = self.lock();
        state.pings += 1;

        match state.script.pop_front() {
            Some(Step::PingFails(err)) => {
                state.failed_pings.push(handle.id);
                futures::future::ready(Err(err)).boxed()
            }
            Some(Step::PingHangs) => futures::future::pending().boxed(),
            Some(other) => {
                // an open-level step queued behind a successful open belongs
                // to the next attempt
                state.script.push_front(other);
                futures::future::ready(Ok(())).boxed()
            }
            None => futures::future::ready(Ok(())).boxed(),
        }
    }

    fn close(&self, handle: MockHandle) {
        self.lock().closed.push(handle.id);
    }
}

/// Assert that a retry result is a [`RetryError::Fatal`](crate::RetryError::Fatal).
///
/// Evaluates to the fatal error.
#[macro_export]
macro_rules! assert_fatal {
    ($result:expr) => {
        match $result {
            Err($crate::RetryError::Fatal(e)) => e,
            other => panic!("Expected Fatal, got {:?}", other),
        }
    };
}

/// Assert that a retry result is a [`RetryError::Exhausted`](crate::RetryError::Exhausted).
///
/// Evaluates to the [`RetryExhausted`](crate::RetryExhausted) payload. The
/// two-argument form also checks the attempt count.
#[macro_export]
macro_rules! assert_exhausted {
    ($result:expr) => {
        match $result {
            Err($crate::RetryError::Exhausted(exhausted)) => exhausted,
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    };
    ($result:expr, $attempts:expr) => {{
        let exhausted = $crate::assert_exhausted!($result);
        assert_eq!(exhausted.attempts, $attempts, "unexpected attempt count");
        exhausted
    }};
}

/// Assert that a retry result is a [`RetryError::Interrupted`](crate::RetryError::Interrupted)
/// with the given reason.
#[macro_export]
macro_rules! assert_interrupted {
    ($result:expr, $reason:expr) => {
        match $result {
            Err($crate::RetryError::Interrupted { reason, .. }) => {
                assert_eq!(reason, $reason, "unexpected interruption reason");
            }
            other => panic!("Expected Interrupted, got {:?}", other),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RetryError, RetryExhausted};
    use std::time::Duration;

    #[tokio::test]
    async fn empty_script_always_succeeds() {
        let connector = MockConnector::new();
        let handle = connector.open("target").await.unwrap();
        connector.ping(&handle).await.unwrap();
        assert_eq!(handle.id(), 1);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.pings(), 1);
        assert_eq!(connector.targets(), vec!["target".to_string()]);
    }

    #[tokio::test]
    async fn script_plays_in_order() {
        let connector = MockConnector::new()
            .then_open_fails(DbError::new("08001", "refused"))
            .then_ping_fails(DbError::new("57P03", "starting"));

        assert!(connector.open("t").await.is_err());
        let handle = connector.open("t").await.unwrap();
        assert!(connector.ping(&handle).await.is_err());
        connector.close(handle);

        assert_eq!(connector.open_calls(), 2);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.failed_ping_ids(), vec![1]);
        assert_eq!(connector.closed_ids(), vec![1]);
    }

    #[tokio::test]
    async fn ping_leaves_open_steps_for_next_attempt() {
        let connector = MockConnector::new()
            .then_ping_fails(DbError::new("57P03", "starting"))
            .then_open_fails(DbError::new("08006", "reset"));

        let first = connector.open("t").await.unwrap();
        assert!(connector.ping(&first).await.is_err());
        assert!(connector.open("t").await.is_err());

        let second = connector.open("t").await.unwrap();
        assert!(connector.ping(&second).await.is_ok());
        assert_eq!(second.id(), 2);
    }

    #[test]
    fn assert_fatal_macro() {
        let result: Result<(), RetryError<&str>> = Err(RetryError::Fatal("boom"));
        assert_eq!(assert_fatal!(result), "boom");
    }

    #[test]
    fn assert_exhausted_macro() {
        let result: Result<(), RetryError<&str>> = Err(RetryError::Exhausted(
            RetryExhausted::new("reset", 3, Duration::from_millis(3)),
        ));
        let exhausted = assert_exhausted!(result, 3);
        assert_eq!(exhausted.final_error, "reset");
    }

    #[test]
    #[should_panic(expected = "Expected Fatal")]
    fn assert_fatal_panics_on_success() {
        let result: Result<u8, RetryError<&str>> = Ok(1);
        let _ = assert_fatal!(result);
    }

    #[test]
    #[should_panic(expected = "Expected Interrupted")]
    fn assert_interrupted_panics_on_fatal() {
        let result: Result<u8, RetryError<&str>> = Err(RetryError::Fatal("boom"));
        assert_interrupted!(result, crate::Interrupted::Cancelled);
    }
}
