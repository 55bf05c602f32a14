//! Reconnect delay policy for the flag channel.
//!
//! The default is a fixed delay repeated forever. Exponential growth, a cap and
//! random jitter can be layered on to keep many clients from reconnecting in
//! lockstep after a server restart.

use std::time::Duration;

/// Delay schedule between connection attempts.
///
/// `delay(attempt) = min(base_delay * multiplier^(attempt - 1), max_delay) + rand(0..=jitter)`
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,

    /// Upper bound on the delay before jitter.
    pub max_delay: Duration,

    /// Growth factor per consecutive failed attempt. 1.0 keeps the delay fixed.
    pub multiplier: f64,

    /// Maximum random delay added on top.
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl ReconnectPolicy {
    /// Same delay before every attempt, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: Duration::ZERO,
        }
    }

    /// Exponential backoff from `base_delay`, capped at `max_delay`.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before reconnect attempt number `attempt` (1-based, counted
    /// since the last successful open).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay.as_millis() as f64;
        let exponential = base * self.multiplier.powi((attempt - 1).min(i32::MAX as u32) as i32);
        let capped = exponential.min(self.max_delay.as_millis().max(self.base_delay.as_millis()) as f64);

        let jitter = if self.jitter.is_zero() {
            0.0
        } else {
            rand::random::<f64>() * self.jitter.as_millis() as f64
        };

        Duration::from_millis((capped + jitter) as u64)
    }
}
