//! Retry policy types and configuration.

use std::time::Duration;

/// Retries allowed after the first attempt when no policy is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Backoff base used when no policy is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// How many times to retry a failed attempt and how long to wait in between.
///
/// Policies are pure data: they describe the schedule but never sleep
/// themselves. A single policy is borrowed by every retry invocation, so it
/// can be shared freely between concurrent callers.
///
/// The delay before retry `n` (0-indexed) is `base_delay * 2^n`, optionally
/// capped by [`with_max_delay`](Self::with_max_delay). Without a cap the
/// delay keeps doubling and saturates at [`Duration::MAX`] rather than
/// overflowing.
///
/// # Examples
///
/// ```rust
/// use dbretry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(100));
///
/// assert_eq!(policy.max_retries(), 3);
/// assert_eq!(policy.max_attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    #[cfg_attr(feature = "serde", serde(default))]
    max_delay: Option<Duration>,
}

/// Information about a retry, passed to hooks and written to the log.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a E,
    /// Backoff slept before the next attempt.
    pub delay: Duration,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_retries` retries after the first attempt,
    /// backing off exponentially from `base_delay`.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Set the maximum number of retry attempts.
    ///
    /// This does not include the initial attempt: `with_max_retries(3)` means
    /// up to 4 total attempts.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the backoff base.
    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Cap every computed delay at `d`.
    ///
    /// ```rust
    /// use dbretry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(10, Duration::from_millis(100))
    ///     .with_max_delay(Duration::from_millis(500));
    ///
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(500)));
    /// ```
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts this policy allows, initial attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Get the backoff base.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Get the maximum delay cap.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Calculate the delay after failed attempt N (0-indexed).
    ///
    /// Returns `None` once `attempt` reaches `max_retries`: no retry follows
    /// the last allowed attempt.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dbretry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_millis(100));
    ///
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// assert_eq!(policy.delay_for_attempt(3), None);
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(self.backoff(attempt))
    }

    /// The raw backoff for attempt N, ignoring `max_retries`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay.saturating_mul(1 << attempt.min(31));
        // 2^attempt no longer fits a u32 multiplier; keep doubling until saturated
        for _ in 31..attempt.min(128) {
            delay = delay.saturating_mul(2);
        }

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));

        assert_eq!(
            policy.delay_for_attempt(0),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            policy.delay_for_attempt(1),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            policy.delay_for_attempt(2),
            Some(Duration::from_millis(400))
        );
        assert_eq!(
            policy.delay_for_attempt(3),
            Some(Duration::from_millis(800))
        );
        assert_eq!(
            policy.delay_for_attempt(4),
            Some(Duration::from_millis(1600))
        );
        assert_eq!(policy.delay_for_attempt(5), None);
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(
            policy.delay_for_attempt(2),
            Some(Duration::from_millis(400))
        );
        assert_eq!(
            policy.delay_for_attempt(3),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            policy.delay_for_attempt(9),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_zero_retries_never_delays() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(0), None);
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::ZERO));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_millis(1));
        assert_eq!(policy.backoff(31), Duration::from_millis(1 << 31));
        assert_eq!(policy.backoff(200), Duration::MAX);
        assert_eq!(policy.backoff(u32::MAX), Duration::MAX);
        assert_eq!(policy.max_attempts(), u32::MAX);
    }

    #[test]
    fn test_default_matches_startup_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.base_delay(), Duration::from_millis(500));
        assert_eq!(policy.max_delay(), None);
    }

    #[test]
    fn test_builders() {
        let policy = RetryPolicy::no_retry()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(10));
        assert_eq!(policy, RetryPolicy::new(2, Duration::from_millis(10)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_policy_deserializes_without_cap() {
        let json = r#"{"max_retries":3,"base_delay":{"secs":0,"nanos":250000000}}"#;
        let policy: RetryPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, RetryPolicy::new(3, Duration::from_millis(250)));
    }
}
