//! Connect to CockroachDB with retries, then insert a row with retries.
//!
//! ```text
//! cockroach start-single-node --insecure &
//! cockroach sql --insecure -e 'CREATE TABLE IF NOT EXISTS users (id SERIAL PRIMARY KEY, name STRING)'
//! RUST_LOG=dbretry=debug cargo run --example insert_user --features postgres
//! ```
//!
//! `DATABASE_URL` and the `DB_RETRY_*` variables override the defaults.

use std::process::ExitCode;
use std::time::Duration;

use dbretry::postgres::PgConnector;
use dbretry::{connect_with_retry, with_retry, DatabaseConfig, RetryContext};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match DatabaseConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let ctx = RetryContext::new().with_timeout(Duration::from_secs(60));
    let connector = PgConnector::new();

    let client = match connect_with_retry(&ctx, &connector, &config.url, &config.retry).await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    let inserted = with_retry(&ctx, &config.retry, || async {
        client
            .execute("INSERT INTO users (name) VALUES ($1)", &[&"john"])
            .await
    })
    .await;

    match inserted {
        Ok(rows) => {
            tracing::info!(rows, "user inserted successfully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to insert user");
            ExitCode::FAILURE
        }
    }
}
