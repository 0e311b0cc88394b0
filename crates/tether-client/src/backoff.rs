//! Reconnect delay policy.

use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff: `base * 2^attempt`, optionally capped and jittered.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max: None,
            jitter: 0.0,
        }
    }

    /// Upper bound applied before jitter.
    pub fn with_max(mut self, max: Option<Duration>) -> Self {
        self.max = max;
        self
    }

    /// Fractional jitter in `[0, 1]`; the delay is moved by up to `±jitter * delay`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let mut delay = self.base.checked_mul(factor).unwrap_or(Duration::MAX);

        if let Some(max) = self.max {
            delay = delay.min(max);
        }

        if self.jitter > 0.0 {
            let secs = delay.as_secs_f64();
            let spread = secs * self.jitter;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            delay = Duration::try_from_secs_f64((secs + offset).max(0.0)).unwrap_or(delay);
        }

        delay
    }
}
