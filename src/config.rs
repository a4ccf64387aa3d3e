//! Connection target and retry policy from the environment.
//!
//! | Variable                 | Meaning                          | Default                |
//! |--------------------------|----------------------------------|------------------------|
//! | `DATABASE_URL`           | connection string                | [`DEFAULT_DATABASE_URL`] |
//! | `DB_RETRY_MAX_RETRIES`   | retries after the first attempt  | 5                      |
//! | `DB_RETRY_BASE_DELAY_MS` | backoff base in milliseconds     | 500                    |
//! | `DB_RETRY_MAX_DELAY_MS`  | optional backoff cap             | none                   |
//!
//! Empty values count as unset.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Local single-node CockroachDB, insecure mode.
pub const DEFAULT_DATABASE_URL: &str =
    "postgresql://root@localhost:26257/defaultdb?sslmode=disable";

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Environment variable overriding [`RetryPolicy::max_retries`].
pub const MAX_RETRIES_VAR: &str = "DB_RETRY_MAX_RETRIES";
/// Environment variable overriding [`RetryPolicy::base_delay`], in milliseconds.
pub const BASE_DELAY_MS_VAR: &str = "DB_RETRY_BASE_DELAY_MS";
/// Environment variable setting [`RetryPolicy::max_delay`], in milliseconds.
pub const MAX_DELAY_MS_VAR: &str = "DB_RETRY_MAX_DELAY_MS";

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to something that does not parse.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        /// The variable name.
        var: &'static str,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Where to connect and how hard to try.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatabaseConfig {
    /// Connection string handed to the connector.
    pub url: String,
    /// Retry policy shared by connection and operation retries.
    #[cfg_attr(feature = "serde", serde(default))]
    pub retry: RetryPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DatabaseConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// ```
    /// use dbretry::DatabaseConfig;
    /// use std::time::Duration;
    ///
    /// let config = DatabaseConfig::from_lookup(|var| match var {
    ///     "DB_RETRY_MAX_RETRIES" => Some("2".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.retry.max_retries(), 2);
    /// assert_eq!(config.retry.base_delay(), Duration::from_millis(500));
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        let url = get(DATABASE_URL_VAR).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let mut retry = RetryPolicy::default();
        if let Some(value) = get(MAX_RETRIES_VAR) {
            retry = retry.with_max_retries(parse_u32(MAX_RETRIES_VAR, &value)?);
        }
        if let Some(value) = get(BASE_DELAY_MS_VAR) {
            retry = retry.with_base_delay(parse_millis(BASE_DELAY_MS_VAR, &value)?);
        }
        if let Some(value) = get(MAX_DELAY_MS_VAR) {
            retry = retry.with_max_delay(parse_millis(MAX_DELAY_MS_VAR, &value)?);
        }

        Ok(Self { url, retry })
    }
}

fn parse_u32(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse()
        .map(Duration::from_millis)
        .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = DatabaseConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DatabaseConfig::default());
        assert_eq!(config.url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn reads_every_variable() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://app@db:26257/bank"),
            ("DB_RETRY_MAX_RETRIES", "3"),
            ("DB_RETRY_BASE_DELAY_MS", " 100 "),
            ("DB_RETRY_MAX_DELAY_MS", "2000"),
        ]))
        .unwrap();

        assert_eq!(config.url, "postgresql://app@db:26257/bank");
        assert_eq!(
            config.retry,
            RetryPolicy::new(3, Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(2))
        );
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", ""),
            ("DB_RETRY_MAX_RETRIES", "  "),
        ]))
        .unwrap();
        assert_eq!(config, DatabaseConfig::default());
    }

    #[test]
    fn rejects_garbage() {
        let err = DatabaseConfig::from_lookup(lookup(&[("DB_RETRY_BASE_DELAY_MS", "fast")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "DB_RETRY_BASE_DELAY_MS", .. }
        ));
        assert!(err.to_string().contains("\"fast\""));
    }

    #[test]
    fn rejects_negative_retries() {
        let err =
            DatabaseConfig::from_lookup(lookup(&[("DB_RETRY_MAX_RETRIES", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DB_RETRY_MAX_RETRIES", .. }));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_default_policy() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"url":"postgresql://localhost"}"#).unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
