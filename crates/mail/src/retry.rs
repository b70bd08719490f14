//! Bounded retry around one remote call
//!
//! Distinct from the adaptive throttle: the throttle decides how fast calls
//! go out in steady state, this module decides what happens after one call
//! fails. Rate limits get a short linear extra wait on top of feeding the
//! throttle; transient server errors get exponential backoff with jitter;
//! fatal errors are returned immediately. Both retryable kinds draw from a
//! single per-item attempt budget.

use log::warn;
use std::time::Duration;
use thiserror::Error;

use crate::api::ApiError;
use crate::throttle::AdaptiveThrottle;

/// Retry tuning for one pipeline. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (so at most
    /// `max_retries + 1` attempts per item)
    pub max_retries: u32,
    /// Linear extra wait after a rate limit: `step * failed_attempts`
    pub rate_limit_wait_step: Duration,
    /// Cap on the linear extra wait
    pub rate_limit_wait_cap: Duration,
    /// Base of the exponential backoff for transient errors
    pub initial_backoff: Duration,
    /// Ceiling of the exponential backoff
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_wait_step: Duration::from_secs(2),
            rate_limit_wait_cap: Duration::from_secs(20),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Extra wait after the `n`th failed rate-limited attempt (1-based)
    fn rate_limit_wait(&self, n: u32) -> Duration {
        self.rate_limit_wait_step
            .saturating_mul(n)
            .min(self.rate_limit_wait_cap)
    }

    /// Backoff after the `n`th failed transient attempt (1-based),
    /// `min(max_backoff, initial_backoff * 2^n)` with ±10% jitter
    fn transient_backoff(&self, n: u32) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(n))
            .min(self.max_backoff);
        exp.mul_f64(0.9 + 0.2 * pseudo_unit())
    }
}

/// Terminal failure of a retried call
#[derive(Debug, Error)]
pub enum RetryError {
    /// The retry budget ran out; `attempts` counts every invocation made
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ApiError },

    /// A non-retryable error, reported on the attempt it occurred
    #[error("{0}")]
    Fatal(ApiError),
}

/// Execute one remote operation under pacing and bounded retry.
///
/// Before every attempt the throttle's blocking wait is applied (when
/// `pacing` is on). Success and rate-limit outcomes feed the throttle;
/// retry sleeps are separate from and additional to the pacing delay.
///
/// Guarantees: at most `policy.max_retries + 1` invocations of `op`, and
/// exactly one terminal outcome, so callers bump exactly one counter.
pub fn call_with_retry<T>(
    policy: &RetryPolicy,
    throttle: &mut AdaptiveThrottle,
    pacing: bool,
    mut op: impl FnMut() -> Result<T, ApiError>,
) -> Result<T, RetryError> {
    let mut attempt = 0u32;

    loop {
        if pacing {
            throttle.wait();
        }

        let err = match op() {
            Ok(value) => {
                throttle.on_success();
                return Ok(value);
            }
            Err(err) => err,
        };
        attempt += 1;

        match &err {
            ApiError::RateLimited => {
                throttle.on_rate_limited();
                if attempt > policy.max_retries {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                let extra = policy.rate_limit_wait(attempt);
                warn!(
                    "rate limited, attempt {}/{}, waiting {:.1}s",
                    attempt,
                    policy.max_retries,
                    extra.as_secs_f64()
                );
                std::thread::sleep(extra);
            }
            ApiError::Transient(status) => {
                if attempt > policy.max_retries {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                let backoff = policy.transient_backoff(attempt);
                warn!(
                    "transient error (status {}), attempt {}/{}, backing off {:.1}s",
                    status,
                    attempt,
                    policy.max_retries,
                    backoff.as_secs_f64()
                );
                std::thread::sleep(backoff);
            }
            ApiError::Fatal(_) => return Err(RetryError::Fatal(err)),
        }
    }
}

/// Pseudo-random value in [0, 1) for jitter, seeded from the hasher's
/// per-process randomness. Good enough distribution without a rand
/// dependency.
fn pseudo_unit() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    (hasher.finish() % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::ThrottleConfig;
    use std::time::Duration;

    /// Policy with zero sleeps so tests run instantly
    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            rate_limit_wait_step: Duration::ZERO,
            rate_limit_wait_cap: Duration::ZERO,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn fast_throttle() -> AdaptiveThrottle {
        AdaptiveThrottle::new(ThrottleConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_millis(1),
            ..ThrottleConfig::default()
        })
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut throttle = fast_throttle();
        let mut calls = 0;
        let result = call_with_retry(&fast_policy(3), &mut throttle, true, || {
            calls += 1;
            Ok::<_, ApiError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_always_rate_limited_makes_max_plus_one_attempts() {
        let mut throttle = fast_throttle();
        let mut calls = 0u32;
        let result = call_with_retry(&fast_policy(3), &mut throttle, true, || {
            calls += 1;
            Err::<(), _>(ApiError::RateLimited)
        });
        assert_eq!(calls, 4);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(last, ApiError::RateLimited));
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let mut throttle = fast_throttle();
        let mut calls = 0u32;
        let result = call_with_retry(&fast_policy(5), &mut throttle, true, || {
            calls += 1;
            Err::<(), _>(ApiError::Fatal("HTTP status 404".to_string()))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Fatal(ApiError::Fatal(_)))));
    }

    #[test]
    fn test_transient_then_success_recovers() {
        let mut throttle = fast_throttle();
        let mut calls = 0u32;
        let result = call_with_retry(&fast_policy(3), &mut throttle, true, || {
            calls += 1;
            if calls < 3 {
                Err(ApiError::Transient(503))
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_rate_limit_and_transient_share_one_budget() {
        // 1 rate limit + 2 transients exhaust max_retries = 2 after the
        // third failed attempt
        let mut throttle = fast_throttle();
        let mut calls = 0u32;
        let result = call_with_retry(&fast_policy(2), &mut throttle, true, || {
            calls += 1;
            if calls == 1 {
                Err::<(), _>(ApiError::RateLimited)
            } else {
                Err(ApiError::Transient(500))
            }
        });
        assert_eq!(calls, 3);
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
    }

    #[test]
    fn test_rate_limit_feeds_throttle() {
        let mut throttle = AdaptiveThrottle::new(ThrottleConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(8),
            wait_fraction: 0.0, // skip actual sleeping
            ..ThrottleConfig::default()
        });
        let _ = call_with_retry(&fast_policy(1), &mut throttle, true, || {
            Err::<(), _>(ApiError::RateLimited)
        });
        // Two failed attempts, delay doubled twice: 100 -> 400ms
        assert_eq!(throttle.current_delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_rate_limit_wait_is_capped() {
        let policy = RetryPolicy {
            rate_limit_wait_step: Duration::from_secs(2),
            rate_limit_wait_cap: Duration::from_secs(20),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.rate_limit_wait(1), Duration::from_secs(2));
        assert_eq!(policy.rate_limit_wait(5), Duration::from_secs(10));
        assert_eq!(policy.rate_limit_wait(50), Duration::from_secs(20));
    }

    #[test]
    fn test_transient_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            ..RetryPolicy::default()
        };
        // Jitter is ±10%, so check against the bounds
        let first = policy.transient_backoff(1);
        assert!(first >= Duration::from_millis(1800) && first <= Duration::from_millis(2200));

        let capped = policy.transient_backoff(30);
        assert!(capped <= Duration::from_secs(66));
        assert!(capped >= Duration::from_secs(54));
    }
}
