//! Transient-failure classification.
//!
//! An error is worth retrying when it carries a SQLSTATE from a fixed
//! allow-list of connection-exception (class 08) and operator-intervention
//! (class 57) codes, or when it is itself a cancellation or deadline signal.
//! Everything else is fatal.
//!
//! # Examples
//!
//! ```
//! use dbretry::{is_retryable, sql_state, DbError, Interrupted};
//!
//! assert!(is_retryable(&DbError::new(sql_state::ADMIN_SHUTDOWN, "terminating connection")));
//! assert!(is_retryable(&Interrupted::DeadlineExceeded));
//! assert!(!is_retryable(&DbError::new("23505", "duplicate key value")));
//! ```

use std::error::Error as StdError;
use std::fmt;

use crate::context::Interrupted;

/// SQLSTATE codes the classifier treats as transient.
pub mod sql_state {
    /// Class 57: operator intervention.
    pub const OPERATOR_INTERVENTION: &str = "57000";
    /// Statement cancelled by the server or a user request.
    pub const QUERY_CANCELED: &str = "57014";
    /// Server is shutting down on administrator command.
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    /// Server is shutting down after a crash.
    pub const CRASH_SHUTDOWN: &str = "57P02";
    /// Server is starting up or in recovery.
    pub const CANNOT_CONNECT_NOW: &str = "57P03";
    /// Database was dropped under the session.
    pub const DATABASE_DROPPED: &str = "57P04";
    /// Session idled past its timeout.
    pub const IDLE_SESSION_TIMEOUT: &str = "57P05";

    /// Class 08: connection exception.
    pub const CONNECTION_EXCEPTION: &str = "08000";
    /// Connection does not exist.
    pub const CONNECTION_DOES_NOT_EXIST: &str = "08003";
    /// Connection failure.
    pub const CONNECTION_FAILURE: &str = "08006";
    /// Client was unable to establish the connection.
    pub const SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION: &str = "08001";
    /// Server rejected establishment of the connection.
    pub const SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION: &str = "08004";
    /// Commit outcome is unknown.
    pub const TRANSACTION_RESOLUTION_UNKNOWN: &str = "08007";
    /// Protocol violation.
    pub const PROTOCOL_VIOLATION: &str = "08P01";
}

/// Every SQLSTATE that marks an error as retryable.
pub const RETRYABLE_SQL_STATES: [&str; 14] = [
    sql_state::OPERATOR_INTERVENTION,
    sql_state::QUERY_CANCELED,
    sql_state::ADMIN_SHUTDOWN,
    sql_state::CRASH_SHUTDOWN,
    sql_state::CANNOT_CONNECT_NOW,
    sql_state::DATABASE_DROPPED,
    sql_state::IDLE_SESSION_TIMEOUT,
    sql_state::CONNECTION_EXCEPTION,
    sql_state::CONNECTION_DOES_NOT_EXIST,
    sql_state::CONNECTION_FAILURE,
    sql_state::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION,
    sql_state::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION,
    sql_state::TRANSACTION_RESOLUTION_UNKNOWN,
    sql_state::PROTOCOL_VIOLATION,
];

/// Verdict for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    /// Expected to clear up if the same work is retried after a delay.
    Retryable,
    /// Retrying cannot help; report the error to the caller.
    Fatal,
}

impl RetryClass {
    /// Returns true for [`RetryClass::Retryable`].
    pub fn is_retryable(self) -> bool {
        self == Self::Retryable
    }
}

/// What the classifier needs to know about an error.
///
/// Both methods default to `None`, which classifies as fatal.
pub trait DatabaseError: fmt::Debug + fmt::Display {
    /// The five-character SQLSTATE the server attached, if any.
    fn sql_state(&self) -> Option<&str> {
        None
    }

    /// Set when the error is a cancellation or deadline signal.
    fn interruption(&self) -> Option<Interrupted> {
        None
    }
}

/// Whether `code` is on the retryable allow-list. Matching is exact.
pub fn is_retryable_sql_state(code: &str) -> bool {
    RETRYABLE_SQL_STATES.contains(&code)
}

/// Classify an error as retryable or fatal.
pub fn classify<E: DatabaseError + ?Sized>(err: &E) -> RetryClass {
    if err.sql_state().is_some_and(is_retryable_sql_state) || err.interruption().is_some() {
        RetryClass::Retryable
    } else {
        RetryClass::Fatal
    }
}

/// Returns true when retrying `err` is appropriate.
pub fn is_retryable<E: DatabaseError + ?Sized>(err: &E) -> bool {
    classify(err).is_retryable()
}

/// Classify an arbitrary error by walking its `source()` chain.
///
/// The first link carrying a SQLSTATE decides the status-code rule, and any
/// link that is a cancellation or deadline signal makes the chain retryable.
/// Chains with nothing recognisable are fatal.
pub fn classify_chain(err: &(dyn StdError + 'static)) -> RetryClass {
    let retryable_code = chain(err)
        .find_map(link_sql_state)
        .is_some_and(is_retryable_sql_state);

    if retryable_code || chain(err).find_map(link_interruption).is_some() {
        RetryClass::Retryable
    } else {
        RetryClass::Fatal
    }
}

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| (*e).source())
}

fn link_sql_state<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a str> {
    if let Some(e) = err.downcast_ref::<DbError>() {
        return Some(e.code());
    }
    #[cfg(feature = "postgres")]
    if let Some(e) = err.downcast_ref::<tokio_postgres::Error>() {
        return e.sql_state();
    }
    None
}

fn link_interruption(err: &(dyn StdError + 'static)) -> Option<Interrupted> {
    if let Some(reason) = err.downcast_ref::<Interrupted>() {
        return Some(*reason);
    }
    if err.is::<tokio::time::error::Elapsed>() {
        return Some(Interrupted::DeadlineExceeded);
    }
    None
}

/// A structured error reported by the database server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (SQLSTATE {code})")]
pub struct DbError {
    code: String,
    message: String,
}

impl DbError {
    /// Create an error with the given SQLSTATE and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The SQLSTATE.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The server's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl DatabaseError for DbError {
    fn sql_state(&self) -> Option<&str> {
        Some(&self.code)
    }
}

impl DatabaseError for Interrupted {
    fn interruption(&self) -> Option<Interrupted> {
        Some(*self)
    }
}

impl DatabaseError for tokio::time::error::Elapsed {
    fn interruption(&self) -> Option<Interrupted> {
        Some(Interrupted::DeadlineExceeded)
    }
}

impl DatabaseError for Box<dyn StdError + Send + Sync + 'static> {
    fn sql_state(&self) -> Option<&str> {
        chain(&**self).find_map(link_sql_state)
    }

    fn interruption(&self) -> Option<Interrupted> {
        chain(&**self).find_map(link_interruption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("inserting user")]
    struct Wrapped(#[source] DbError);

    #[test]
    fn every_allow_listed_code_is_retryable() {
        for code in RETRYABLE_SQL_STATES {
            assert!(
                is_retryable(&DbError::new(code, "transient")),
                "{} should be retryable",
                code
            );
        }
    }

    #[test]
    fn common_permanent_codes_are_fatal() {
        for code in ["23505", "42601", "42P01", "40001", "28P01", "", "57p01", "08"] {
            assert_eq!(
                classify(&DbError::new(code, "permanent")),
                RetryClass::Fatal,
                "{:?} should be fatal",
                code
            );
        }
    }

    #[test]
    fn interruptions_are_retryable() {
        assert!(is_retryable(&Interrupted::Cancelled));
        assert!(is_retryable(&Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn elapsed_timeout_is_retryable() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::ZERO,
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(is_retryable(&elapsed));
    }

    #[test]
    fn unstructured_error_is_fatal() {
        #[derive(Debug)]
        struct Plain;
        impl fmt::Display for Plain {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("plain")
            }
        }
        impl DatabaseError for Plain {}

        assert_eq!(classify(&Plain), RetryClass::Fatal);
    }

    #[test]
    fn chain_finds_wrapped_sql_state() {
        let err = Wrapped(DbError::new(sql_state::CONNECTION_FAILURE, "reset by peer"));
        assert_eq!(classify_chain(&err), RetryClass::Retryable);

        let err = Wrapped(DbError::new("23505", "duplicate key"));
        assert_eq!(classify_chain(&err), RetryClass::Fatal);
    }

    #[test]
    fn boxed_errors_classify_through_chain() {
        let boxed: Box<dyn StdError + Send + Sync> =
            Box::new(Wrapped(DbError::new(sql_state::ADMIN_SHUTDOWN, "shutdown")));
        assert!(is_retryable(&boxed));

        let boxed: Box<dyn StdError + Send + Sync> = Box::new(Interrupted::Cancelled);
        assert_eq!(boxed.interruption(), Some(Interrupted::Cancelled));

        let boxed: Box<dyn StdError + Send + Sync> = "no structure".into();
        assert!(!is_retryable(&boxed));
    }

    #[test]
    fn db_error_display_includes_code() {
        let err = DbError::new("57P01", "terminating connection due to administrator command");
        assert_eq!(err.code(), "57P01");
        assert_eq!(
            err.to_string(),
            "terminating connection due to administrator command (SQLSTATE 57P01)"
        );
    }
}
