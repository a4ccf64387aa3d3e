//! Acquiring a live database handle with retries.

use futures::future::BoxFuture;

use crate::classify::{classify, DatabaseError};
use crate::context::RetryContext;
use crate::retry::executor::{drive, Operation};
use crate::retry::{RetryError, RetryEvent, RetryPolicy};

/// The transport primitives [`connect_with_retry`] needs.
///
/// Implementations open a handle against a target string, check that it is
/// alive, and release it. The retry engine never looks inside the handle.
pub trait Connector: Send + Sync {
    /// A live connection or pool.
    type Handle: Send;
    /// Errors from opening or pinging.
    type Error: DatabaseError + Send;

    /// Open a handle against `target`.
    fn open<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<Self::Handle, Self::Error>>;

    /// Check that `handle` can reach the server.
    fn ping<'a>(&'a self, handle: &'a Self::Handle) -> BoxFuture<'a, Result<(), Self::Error>>;

    /// Release a handle that will not be handed to the caller.
    fn close(&self, handle: Self::Handle);
}

/// Open and ping a handle, retrying transient failures.
///
/// A handle is only returned once its ping succeeds. A handle that opened
/// but failed its ping, or whose ping was cut short by `ctx`, is closed
/// through [`Connector::close`] before anything else happens.
///
/// # Example
///
/// ```rust
/// use dbretry::testing::MockConnector;
/// use dbretry::{connect_with_retry, sql_state, DbError, RetryContext, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let connector = MockConnector::new()
///     .then_ping_fails(DbError::new(sql_state::CANNOT_CONNECT_NOW, "starting up"));
///
/// let handle = connect_with_retry(
///     &RetryContext::new(),
///     &connector,
///     "postgresql://root@localhost:26257/defaultdb",
///     &RetryPolicy::new(3, Duration::from_millis(1)),
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(handle.id(), 2);
/// assert_eq!(connector.closed(), 1);
/// # });
/// ```
pub async fn connect_with_retry<C: Connector>(
    ctx: &RetryContext,
    connector: &C,
    target: &str,
    policy: &RetryPolicy,
) -> Result<C::Handle, RetryError<C::Error>> {
    connect_with_retry_notify(ctx, connector, target, policy, |_: &RetryEvent<'_, C::Error>| {})
        .await
}

/// Like [`connect_with_retry`], calling `on_retry` before every backoff sleep.
pub async fn connect_with_retry_notify<C, H>(
    ctx: &RetryContext,
    connector: &C,
    target: &str,
    policy: &RetryPolicy,
    on_retry: H,
) -> Result<C::Handle, RetryError<C::Error>>
where
    C: Connector,
    H: FnMut(&RetryEvent<'_, C::Error>),
{
    drive(
        ctx,
        policy,
        Operation::Connect,
        move || async move {
            let handle = match ctx.run(connector.open(target)).await {
                Ok(Ok(handle)) => handle,
                Ok(Err(err)) => return Ok(Err(err)),
                Err(reason) => return Err(reason),
            };

            let pinged = ctx.run(connector.ping(&handle)).await;
            match pinged {
                Ok(Ok(())) => Ok(Ok(handle)),
                Ok(Err(err)) => {
                    connector.close(handle);
                    Ok(Err(err))
                }
                Err(reason) => {
                    connector.close(handle);
                    Err(reason)
                }
            }
        },
        |err: &C::Error| classify(err),
        on_retry,
    )
    .await
}
