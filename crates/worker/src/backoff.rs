//! Exponential backoff policies for failed send attempts.
//!
//! `delay = min(base × 2^(attempt − 1), cap)`.
//!
//! Two policies coexist on purpose. Retry-originated failures back off from a
//! 5 minute base capped at 1 hour. The very first failure is handled inside
//! the Dispatch Worker before any retry row exists and backs off from a
//! 1 minute base with no cap. The asymmetry is inherited behavior — keep both
//! until product confirms a unified formula.

use chrono::Duration;

use courier_common::config::AppConfig;

/// Backoff parameters for one class of failure.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Option<Duration>,
}

impl BackoffPolicy {
    /// Policy for a notification's first failure, applied by the Dispatch Worker.
    pub fn first_failure(config: &AppConfig) -> Self {
        Self {
            base: Duration::seconds(config.first_retry_base_secs as i64),
            cap: None,
        }
    }

    /// Policy for retry-originated failures, applied by the Retry Worker.
    pub fn retry(config: &AppConfig) -> Self {
        Self {
            base: Duration::seconds(config.retry_base_secs as i64),
            cap: Some(Duration::seconds(config.retry_max_delay_secs as i64)),
        }
    }

    /// Delay before `attempt` (1-based) may run.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let delay = self.base * 2_i32.pow(exponent);
        match self.cap {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_secs: i64, cap_secs: Option<i64>) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::seconds(base_secs),
            cap: cap_secs.map(Duration::seconds),
        }
    }

    #[test]
    fn test_doubles_per_attempt() {
        let p = policy(300, Some(3600));
        assert_eq!(p.delay_for(1), Duration::seconds(300));
        assert_eq!(p.delay_for(2), Duration::seconds(600));
        assert_eq!(p.delay_for(3), Duration::seconds(1200));
    }

    #[test]
    fn test_cap_applies() {
        let p = policy(300, Some(3600));
        assert_eq!(p.delay_for(5), Duration::seconds(3600));
        assert_eq!(p.delay_for(12), Duration::seconds(3600));
    }

    #[test]
    fn test_monotonic_until_cap() {
        let p = policy(300, Some(3600));
        for attempt in 1..12 {
            assert!(p.delay_for(attempt) <= p.delay_for(attempt + 1));
            assert!(p.delay_for(attempt) <= Duration::seconds(3600));
        }
    }

    #[test]
    fn test_first_failure_uncapped() {
        let p = policy(60, None);
        assert_eq!(p.delay_for(1), Duration::seconds(60));
        assert_eq!(p.delay_for(7), Duration::seconds(60 * 64));
        // No cap: keeps growing monotonically
        for attempt in 1..20 {
            assert!(p.delay_for(attempt) < p.delay_for(attempt + 1));
        }
    }
}
