//! Retry policy: decides how many times and how long to wait.

use std::time::Duration;

use rand::Rng;

/// Retry policy for transient stage failures (fetch / publish).
///
/// Exponential backoff capped at `max_delay`, with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. 1 means "no retry".
    pub max_attempts: u32,

    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Random spread applied by [`RetryPolicy::jittered_delay`], as a
    /// fraction of the delay (0.1 = ±10%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Is another attempt allowed after `attempts` have been made?
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next attempt, given the number of attempts already
    /// made (1-indexed).
    ///
    /// delay = min(base_delay * multiplier^(attempts - 1), max_delay)
    ///
    /// Example with base_delay=500ms, multiplier=2.0:
    /// - attempt 1 (first failure): 500ms
    /// - attempt 2: 1s
    /// - attempt 3: 2s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        if !delay_secs.is_finite() || delay_secs >= max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }

    /// [`RetryPolicy::next_delay`] spread by ±`jitter` so workers retrying
    /// the same host do not wake in lockstep.
    pub fn jittered_delay(&self, attempts: u32) -> Duration {
        let delay = self.next_delay(attempts);
        let spread = self.jitter.clamp(0.0, 1.0);
        if spread == 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        delay.mul_f64(factor)
    }
}
