//! Property-based tests for classification and backoff.

use std::time::Duration;

use dbretry::{
    classify, classify_chain, is_retryable, DbError, Interrupted, RetryClass, RetryContext,
    RetryPolicy, RETRYABLE_SQL_STATES,
};
use proptest::prelude::*;

fn sql_state_like() -> impl Strategy<Value = String> {
    "[0-9A-Z]{5}"
}

proptest! {
    #[test]
    fn prop_allow_listed_codes_are_retryable(
        idx in 0..RETRYABLE_SQL_STATES.len(),
        message in ".*",
    ) {
        let err = DbError::new(RETRYABLE_SQL_STATES[idx], message);
        prop_assert!(is_retryable(&err));
    }

    #[test]
    fn prop_other_codes_are_fatal(code in sql_state_like()) {
        prop_assume!(!RETRYABLE_SQL_STATES.contains(&code.as_str()));
        prop_assert_eq!(classify(&DbError::new(code, "boom")), RetryClass::Fatal);
    }

    #[test]
    fn prop_arbitrary_strings_never_panic(code in ".*") {
        let verdict = classify(&DbError::new(code.clone(), ""));
        prop_assert_eq!(
            verdict.is_retryable(),
            RETRYABLE_SQL_STATES.contains(&code.as_str())
        );
    }

    #[test]
    fn prop_delays_double_until_max_retries(
        base_ms in 0u64..1_000,
        max_retries in 0u32..16,
    ) {
        let base = Duration::from_millis(base_ms);
        let policy = RetryPolicy::new(max_retries, base);

        for attempt in 0..max_retries {
            prop_assert_eq!(
                policy.delay_for_attempt(attempt),
                Some(base * 2u32.pow(attempt))
            );
        }
        prop_assert_eq!(policy.delay_for_attempt(max_retries), None);
    }

    #[test]
    fn prop_capped_delays_never_exceed_cap_and_never_shrink(
        base_ms in 1u64..1_000,
        cap_ms in 1u64..100_000,
        attempts in 1u32..200,
    ) {
        let cap = Duration::from_millis(cap_ms);
        let policy = RetryPolicy::new(u32::MAX, Duration::from_millis(base_ms)).with_max_delay(cap);

        let mut previous = Duration::ZERO;
        for attempt in 0..attempts {
            let delay = policy.delay_for_attempt(attempt).unwrap();
            prop_assert!(delay <= cap);
            prop_assert!(delay >= previous);
            previous = delay;
        }
    }
}

#[test]
fn expired_context_reason_is_retryable() {
    let ctx = RetryContext::new().with_deadline(tokio::time::Instant::now());
    let reason = ctx.err().unwrap();
    assert_eq!(reason, Interrupted::DeadlineExceeded);
    assert!(is_retryable(&reason));
}

#[test]
fn chain_classification_matches_direct_classification() {
    for code in RETRYABLE_SQL_STATES.iter().copied().chain(["42601", "23503"]) {
        let err = DbError::new(code, "x");
        assert_eq!(classify_chain(&err), classify(&err), "{}", code);
    }
}
