//! [`Connector`] over `tokio-postgres`.
//!
//! Each handle owns one client plus the spawned task driving its socket.
//! TLS is not negotiated; point the target at a cluster that accepts
//! `sslmode=disable`, or wrap your own connector for TLS.

use std::fmt;
use std::ops::Deref;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

use crate::classify::DatabaseError;
use crate::connect::Connector;

/// A connected client and the task driving its connection.
///
/// Dereferences to [`tokio_postgres::Client`]. Dropping the handle drops the
/// client, which lets the driver task finish on its own.
pub struct PgHandle {
    client: Client,
    driver: JoinHandle<()>,
}

impl fmt::Debug for PgHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgHandle")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

impl PgHandle {
    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Deref for PgHandle {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

/// Opens plain-TCP connections with `tokio_postgres::connect`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for PgConnector {
    type Handle = PgHandle;
    type Error = tokio_postgres::Error;

    fn open<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<PgHandle, Self::Error>> {
        async move {
            let (client, connection) = tokio_postgres::connect(target, NoTls).await?;
            let driver = tokio::spawn(async move {
                if let Err(_err) = connection.await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_err, "database connection closed with error");
                }
            });
            Ok::<_, tokio_postgres::Error>(PgHandle { client, driver })
        }
        .boxed()
    }

    fn ping<'a>(&'a self, handle: &'a PgHandle) -> BoxFuture<'a, Result<(), Self::Error>> {
        async move {
            handle.client.simple_query("SELECT 1").await?;
            Ok::<_, tokio_postgres::Error>(())
        }
        .boxed()
    }

    fn close(&self, handle: PgHandle) {
        let PgHandle { client, driver } = handle;
        drop(client);
        driver.abort();
    }
}

impl DatabaseError for tokio_postgres::Error {
    fn sql_state(&self) -> Option<&str> {
        self.code().map(|state| state.code())
    }
}
