//! Adaptive request pacing
//!
//! Tracks one delay value that every paced call sleeps for before going
//! out. Rate-limit responses grow the delay immediately; sustained success
//! shrinks it slowly. Backoff after an individual failure is a separate
//! concern, handled by the retry wrapper.

use log::{info, warn};
use std::time::Duration;

/// Minimum pause when a preset scales waits below the configured delay
const SCALED_WAIT_FLOOR: Duration = Duration::from_millis(10);

/// Tuning for [`AdaptiveThrottle`].
///
/// Immutable once constructed; the presets replace ad hoc runtime
/// reconfiguration. Invariants assumed by the throttle:
/// `initial_delay <= max_delay`, `backoff_factor > 1`,
/// `success_reduction < 1`.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Starting delay, also the floor the delay can recover down to
    pub initial_delay: Duration,
    /// Ceiling the delay can grow to under sustained rate limiting
    pub max_delay: Duration,
    /// Multiplier applied to the delay on every rate-limit signal
    pub backoff_factor: f64,
    /// Multiplier applied after a success streak (below 1)
    pub success_reduction: f64,
    /// Consecutive successes required before the delay shrinks once
    pub success_threshold: u32,
    /// Fraction of the delay actually slept; the turbo preset halves waits
    pub wait_fraction: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
            success_reduction: 0.85,
            success_threshold: 5,
            wait_fraction: 1.0,
        }
    }
}

impl ThrottleConfig {
    /// Fast preset: shorter starting delay, quicker recovery, halved waits.
    /// Riskier against a strict backend.
    pub fn turbo() -> Self {
        Self {
            initial_delay: Duration::from_millis(20),
            success_threshold: 3,
            wait_fraction: 0.5,
            ..Self::default()
        }
    }

    /// Conservative preset: longer delays, slower recovery, higher ceiling
    pub fn conservative() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(15),
            success_threshold: 10,
            ..Self::default()
        }
    }
}

/// Adaptive pacing state for one run.
///
/// Exactly one instance per run with exactly one writer; `&mut` on the
/// mutating methods enforces that discipline at compile time. The current
/// delay always stays within `[initial_delay, max_delay]`.
#[derive(Debug)]
pub struct AdaptiveThrottle {
    config: ThrottleConfig,
    current_delay: Duration,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl AdaptiveThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }

    /// Record one successful call.
    ///
    /// Every `success_threshold` consecutive successes the delay shrinks
    /// by `success_reduction`, clamped to the `initial_delay` floor.
    pub fn on_success(&mut self) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        if self.consecutive_successes >= self.config.success_threshold {
            let old = self.current_delay;
            self.current_delay = self
                .current_delay
                .mul_f64(self.config.success_reduction)
                .max(self.config.initial_delay);
            self.consecutive_successes = 0;

            if old != self.current_delay {
                info!(
                    "throttle: speeding up {:.3}s -> {:.3}s",
                    old.as_secs_f64(),
                    self.current_delay.as_secs_f64()
                );
            }
        }
    }

    /// Record one rate-limit response.
    ///
    /// Grows the delay by `backoff_factor` immediately, clamped to the
    /// `max_delay` ceiling, and resets the success streak.
    pub fn on_rate_limited(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;

        let old = self.current_delay;
        self.current_delay = self
            .current_delay
            .mul_f64(self.config.backoff_factor)
            .min(self.config.max_delay);

        warn!(
            "throttle: rate limited, slowing down {:.3}s -> {:.3}s",
            old.as_secs_f64(),
            self.current_delay.as_secs_f64()
        );
    }

    /// Blocking pause before the next paced call.
    ///
    /// The sole pacing suspension point; retry backoff sleeps separately.
    pub fn wait(&self) {
        if self.config.wait_fraction < 1.0 {
            let scaled = self.current_delay.mul_f64(self.config.wait_fraction);
            std::thread::sleep(scaled.max(SCALED_WAIT_FLOOR));
        } else {
            std::thread::sleep(self.current_delay);
        }
    }

    /// Current pacing delay, for progress display and final reporting
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Length of the current rate-limit streak
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
