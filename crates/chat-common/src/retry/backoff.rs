//! Exponential backoff shared by REST retries and gateway reconnects.

use rand::Rng;
use std::time::Duration;

use crate::config::{GatewayConfig, RestConfig};

/// Exponential backoff policy.
///
/// Attempts are numbered from 1; the first retry waits `initial_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Number of attempts allowed before giving up.
    pub max_attempts: u32,
    /// Add up to 25% random spread to each delay.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 5,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Retry policy for network failures and 5xx responses.
    #[must_use]
    pub fn for_rest(config: &RestConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            multiplier: 2.0,
            max_attempts: config.max_retries,
            jitter: false,
        }
    }

    /// Reconnect policy for the gateway connect phase.
    #[must_use]
    pub fn for_gateway(config: &GatewayConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.backoff_initial_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            multiplier: 2.0,
            max_attempts: config.max_connect_attempts,
            jitter: true,
        }
    }

    /// Delay to wait after the given failed attempt, without jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1).min(32) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    /// Delay to wait after the given failed attempt, with jitter if enabled.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let spread = base.as_millis() as u64 / 4;
        let extra = rand::thread_rng().gen_range(0..=spread);
        (base + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// Check if another attempt is allowed after `attempt` failures.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
