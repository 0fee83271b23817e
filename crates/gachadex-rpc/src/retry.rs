//! Retry policy for the HTTP RPC client.
//!
//! Exponential backoff with a hard cap. The WebSocket reconnect loop uses
//! its own linear schedule (see `ws`); this policy only covers individual
//! HTTP calls.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling for the backoff growth.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Stateless: computes the delay for a given (1-based) retry attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt`, or `None` once exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.config.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some((self.config.initial_backoff * factor).min(self.config.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        });
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(350)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_millis(350)));
        assert_eq!(policy.next_delay(6), None);
    }
}
