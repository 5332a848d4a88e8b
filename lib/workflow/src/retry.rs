//! Retry settings and the pluggable retry policy.
//!
//! The engine asks the policy, after every failed attempt, whether and
//! when to try again. Settings come from the node, falling back to the
//! workflow; with neither, a node gets exactly one attempt.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `initial * 2^(n-1)`
    #[default]
    Exponential,
    /// `initial * n`
    Linear,
    /// `initial * fib(n)`
    Fibonacci,
    /// `initial`
    Fixed,
}

/// Per-node or per-workflow retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    /// Total attempts including the first; 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Codes to retry instead of the default classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable_errors: Option<Vec<ErrorCode>>,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retryable_errors: None,
        }
    }
}

impl RetrySettings {
    /// Settings allowing `max_attempts` attempts with default backoff.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the initial and maximum delays.
    #[must_use]
    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        self.max_delay_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Restricts retries to the given codes.
    #[must_use]
    pub fn retry_on(mut self, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        self.retryable_errors = Some(codes.into_iter().collect());
        self
    }

    /// Returns true if a failure with this code may be retried.
    ///
    /// Validation, lookup, cancellation and run-deadline failures never are.
    #[must_use]
    pub fn is_retryable(&self, code: &ErrorCode) -> bool {
        if matches!(
            code,
            ErrorCode::ValidationError
                | ErrorCode::NotFound
                | ErrorCode::ExecutionTimeout
                | ErrorCode::Cancelled
        ) {
            return false;
        }
        match &self.retryable_errors {
            Some(codes) => codes.contains(code),
            None => code.is_retryable(),
        }
    }

    /// Delay before retry number `retry` (1-based), capped at the maximum.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = u64::from(retry.max(1));
        let initial = self.initial_delay_ms;
        let raw = match self.backoff {
            Backoff::Exponential => {
                let factor = 1u64.checked_shl((retry - 1) as u32).unwrap_or(u64::MAX);
                initial.saturating_mul(factor)
            }
            Backoff::Linear => initial.saturating_mul(retry),
            Backoff::Fibonacci => initial.saturating_mul(fibonacci(retry)),
            Backoff::Fixed => initial,
        };
        Duration::from_millis(raw.min(self.max_delay_ms))
    }
}

/// `fib(1) = fib(2) = 1`, saturating.
fn fibonacci(n: u64) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a.saturating_add(b));
    }
    a
}

/// Decides whether a failed attempt is retried, and after how long.
pub trait RetryPolicy: Send + Sync {
    /// Returns the delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the number of attempts made so far.
    fn next_delay(&self, settings: &RetrySettings, code: &ErrorCode, attempt: u32)
    -> Option<Duration>;
}

/// Retries classified failures on the configured backoff schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackoffRetryPolicy;

impl RetryPolicy for BackoffRetryPolicy {
    fn next_delay(
        &self,
        settings: &RetrySettings,
        code: &ErrorCode,
        attempt: u32,
    ) -> Option<Duration> {
        if attempt >= settings.max_attempts || !settings.is_retryable(code) {
            return None;
        }
        Some(settings.delay_for(attempt))
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn next_delay(&self, _: &RetrySettings, _: &ErrorCode, _: u32) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn defaults_disable_retries() {
        let settings = RetrySettings::default();
        assert_eq!(settings.max_attempts, 1);
        assert_eq!(
            BackoffRetryPolicy.next_delay(&settings, &ErrorCode::Http(503), 1),
            None
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let settings: RetrySettings =
            serde_json::from_value(json!({"maxAttempts": 3, "backoff": "linear"}))
                .expect("deserialize");
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.backoff, Backoff::Linear);
        assert_eq!(settings.initial_delay_ms, 1000);
        assert_eq!(settings.max_delay_ms, 60_000);
    }

    #[test]
    fn exponential_schedule() {
        let settings = RetrySettings::attempts(10);
        assert_eq!(settings.delay_for(1), ms(1000));
        assert_eq!(settings.delay_for(2), ms(2000));
        assert_eq!(settings.delay_for(3), ms(4000));
        assert_eq!(settings.delay_for(7), ms(60_000));
        assert_eq!(settings.delay_for(200), ms(60_000));
    }

    #[test]
    fn linear_fibonacci_fixed_schedules() {
        let linear = RetrySettings::attempts(5).with_backoff(Backoff::Linear);
        assert_eq!(linear.delay_for(3), ms(3000));

        let fib = RetrySettings::attempts(5).with_backoff(Backoff::Fibonacci);
        let delays: Vec<_> = (1..=6).map(|n| fib.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![ms(1000), ms(1000), ms(2000), ms(3000), ms(5000), ms(8000)]
        );

        let fixed = RetrySettings::attempts(5)
            .with_backoff(Backoff::Fixed)
            .with_delays(ms(250), ms(1000));
        assert_eq!(fixed.delay_for(4), ms(250));
    }

    #[test]
    fn policy_respects_attempt_budget() {
        let settings = RetrySettings::attempts(3).with_delays(ms(10), ms(100));
        let policy = BackoffRetryPolicy;
        assert_eq!(policy.next_delay(&settings, &ErrorCode::Timeout, 1), Some(ms(10)));
        assert_eq!(policy.next_delay(&settings, &ErrorCode::Timeout, 2), Some(ms(20)));
        assert_eq!(policy.next_delay(&settings, &ErrorCode::Timeout, 3), None);
    }

    #[test]
    fn policy_is_keyed_by_error_code() {
        let settings = RetrySettings::attempts(3);
        let policy = BackoffRetryPolicy;
        assert!(policy.next_delay(&settings, &ErrorCode::Http(503), 1).is_some());
        assert!(policy.next_delay(&settings, &ErrorCode::Http(404), 1).is_none());
        assert!(policy.next_delay(&settings, &ErrorCode::ValidationError, 1).is_none());
    }

    #[test]
    fn explicit_retryable_list_overrides_classification() {
        let settings = RetrySettings::attempts(3).retry_on([
            ErrorCode::EmailSendError,
            ErrorCode::ExecutionTimeout,
        ]);
        assert!(settings.is_retryable(&ErrorCode::EmailSendError));
        assert!(!settings.is_retryable(&ErrorCode::Http(503)));
        assert!(!settings.is_retryable(&ErrorCode::ExecutionTimeout));
    }

    #[test]
    fn no_retry_policy_never_retries() {
        let settings = RetrySettings::attempts(5);
        assert_eq!(NoRetryPolicy.next_delay(&settings, &ErrorCode::Timeout, 1), None);
    }
}
