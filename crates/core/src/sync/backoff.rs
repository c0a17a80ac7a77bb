//! Exponential backoff with cap and jitter

use std::time::Duration;

use rand::Rng;
use tideline_domain::RetryConfig;

/// Base-2 exponential backoff, capped, with symmetric jitter.
///
/// The raw curve is `base * 2^(attempts-1)` up to `cap`; each delay is then
/// spread by `jitter_ratio` (±20% by default) so a burst of failures does
/// not retry in lockstep against a recovering endpoint.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, jitter_ratio: f64) -> Self {
        Self { base, cap, jitter_ratio: jitter_ratio.clamp(0.0, 1.0) }
    }

    /// Deterministic delay for the given attempt count, before jitter.
    ///
    /// `attempts` is the number of completed failed attempts, starting at 1.
    pub fn raw_delay(&self, attempts: u32) -> Duration {
        let shift = attempts.saturating_sub(1).min(16);
        let multiplier = 1u64 << shift;
        self.base.saturating_mul(u32::try_from(multiplier).unwrap_or(u32::MAX)).min(self.cap)
    }

    /// Jittered delay for the given attempt count.
    pub fn delay(&self, attempts: u32) -> Duration {
        let raw = self.raw_delay(attempts);
        if self.jitter_ratio == 0.0 {
            return raw;
        }

        let spread = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        let factor = 1.0 + spread;
        Duration::from_secs_f64((raw.as_secs_f64() * factor).max(0.0))
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.max_delay, config.jitter_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(300), 0.2)
    }

    #[test]
    fn raw_delay_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.raw_delay(1), Duration::from_secs(2));
        assert_eq!(policy.raw_delay(2), Duration::from_secs(4));
        assert_eq!(policy.raw_delay(3), Duration::from_secs(8));
        assert_eq!(policy.raw_delay(8), Duration::from_secs(256));
        assert_eq!(policy.raw_delay(9), Duration::from_secs(300));
        assert_eq!(policy.raw_delay(20), Duration::from_secs(300));
    }

    #[test]
    fn raw_delay_is_monotone_before_cap() {
        let policy = policy();
        for attempts in 1..8 {
            assert!(policy.raw_delay(attempts + 1) > policy.raw_delay(attempts));
        }
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let policy = policy();
        for attempts in 1..=9 {
            let raw = policy.raw_delay(attempts).as_secs_f64();
            for _ in 0..50 {
                let delay = policy.delay(attempts).as_secs_f64();
                assert!(delay >= raw * 0.8 - f64::EPSILON);
                assert!(delay <= raw * 1.2 + f64::EPSILON);
            }
        }
    }

    #[test]
    fn jittered_delays_remain_monotone_with_20_percent_spread() {
        // 2x growth dominates a ±20% spread: max(n) = 1.2 * raw(n) is still
        // below min(n+1) = 0.8 * 2 * raw(n).
        let policy = policy();
        for attempts in 1..8 {
            let upper = policy.raw_delay(attempts).as_secs_f64() * 1.2;
            let lower = policy.raw_delay(attempts + 1).as_secs_f64() * 0.8;
            assert!(lower > upper);
        }
    }

    #[test]
    fn zero_jitter_returns_raw_delay() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(300), 0.0);
        assert_eq!(policy.delay(3), policy.raw_delay(3));
    }
}
