//! Bounded retry with fixed or exponential backoff.
//!
//! [`ActionRetry`] wraps any fallible interaction. Errors whose
//! [`ErrorKind`] is in the policy's retryable list are retried after the
//! current delay; everything else propagates on the spot. When attempts run
//! out the last error is returned unchanged.

use crate::clock::SharedClock;
use crate::config::millis;
use crate::result::{ErrorKind, ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first call
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Error kinds worth retrying
    #[serde(alias = "retryable_error_kinds")]
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            retryable: Self::default_retryable(),
        }
    }
}

impl RetryPolicy {
    /// Kinds retried unless configured otherwise
    #[must_use]
    pub fn default_retryable() -> Vec<ErrorKind> {
        vec![
            ErrorKind::NotFound,
            ErrorKind::Timeout,
            ErrorKind::StaleHandle,
            ErrorKind::Assertion,
        ]
    }

    /// Same delay before every retry
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            backoff_multiplier: 1.0,
            ..Self::default()
        }
    }

    /// Delay multiplied by `multiplier` after each retry
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier: multiplier,
            ..Self::default()
        }
    }

    /// Replace the retryable kinds
    #[must_use]
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Also retry `kind`
    #[must_use]
    pub fn retrying(mut self, kind: ErrorKind) -> Self {
        if !self.retryable.contains(&kind) {
            self.retryable.push(kind);
        }
        self
    }

    /// Whether `error` may be retried under this policy
    #[must_use]
    pub fn is_retryable(&self, error: &ProbeError) -> bool {
        self.retryable.contains(&error.kind())
    }

    /// Delay slept before retry number `retry` (1-based).
    ///
    /// `initial * multiplier^(retry-1)`; zero for retry 0, the first call.
    #[must_use]
    pub fn delay_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        if nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Validate budgets
    ///
    /// # Errors
    ///
    /// Returns a config error for a multiplier below 1 or not finite
    pub fn validate(&self) -> ProbeResult<()> {
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ProbeError::config(
                "retry.backoff_multiplier must be a finite number >= 1",
            ));
        }
        Ok(())
    }

    /// Most invocations this policy allows, first call included
    #[must_use]
    pub const fn max_calls(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Core loop shared by [`ActionRetry`] and the device context.
    ///
    /// `op` receives the 1-based call number; retry `k` is call `k + 1`.
    pub(crate) fn drive<S, T>(
        &self,
        state: &mut S,
        mut sleep: impl FnMut(&mut S, Duration),
        mut op: impl FnMut(&mut S, u32) -> ProbeResult<T>,
    ) -> ProbeResult<T> {
        let mut retries = 0;
        loop {
            match op(state, retries + 1) {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if retries < self.max_attempts && self.is_retryable(&err) => {
                    retries += 1;
                    let delay = self.delay_before(retries);
                    warn!(retry = retries, max_retries = self.max_attempts, ?delay, error = %err, "retrying");
                    sleep(state, delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Applies a [`RetryPolicy`] to a closure, sleeping through a clock
#[derive(Debug, Clone)]
pub struct ActionRetry {
    policy: RetryPolicy,
    clock: SharedClock,
}

impl ActionRetry {
    /// Create a retrier
    #[must_use]
    pub const fn new(policy: RetryPolicy, clock: SharedClock) -> Self {
        Self { policy, clock }
    }

    /// The policy in use
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, passing the 1-based call number
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> ProbeResult<T>) -> ProbeResult<T> {
        let clock = &self.clock;
        self.policy
            .drive(&mut (), |_, delay| clock.sleep(delay), |_, attempt| op(attempt))
    }
}
