//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::retries::RetryPolicy;

/// Relative jitter applied on either side of the computed delay.
pub const JITTER_RATIO: f64 = 0.10;

/// Source of the multiplicative jitter factor.
pub trait Jitter: Send + Sync {
    /// A factor in `[1 - JITTER_RATIO, 1 + JITTER_RATIO]`.
    fn factor(&self) -> f64;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl Jitter for UniformJitter {
    fn factor(&self) -> f64 {
        rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO))
    }
}

/// Fixed factor, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn factor(&self) -> f64 {
        self.0.clamp(1.0 - JITTER_RATIO, 1.0 + JITTER_RATIO)
    }
}

fn base_delay_ms(policy: &RetryPolicy, retry_count: u32) -> f64 {
    let max_ms = policy.max_delay.as_millis() as f64;
    let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
    let raw_ms = policy.initial_delay.as_millis() as f64 * policy.backoff_factor.powi(exponent);

    if raw_ms.is_finite() {
        raw_ms.min(max_ms).max(0.0)
    } else {
        max_ms
    }
}

/// `min(initial_delay * backoff_factor^retry_count, max_delay)`, before jitter.
pub fn base_delay(policy: &RetryPolicy, retry_count: u32) -> Duration {
    Duration::from_millis(base_delay_ms(policy, retry_count).round() as u64)
}

/// Delay before the retry that follows attempt number `retry_count`.
pub fn calculate_backoff(policy: &RetryPolicy, retry_count: u32, jitter: &dyn Jitter) -> Duration {
    let jittered = base_delay_ms(policy, retry_count) * jitter.factor();
    Duration::from_millis(jittered.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, max_ms: u64, factor: f64) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_factor: factor,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let p = policy(100, 2000, 2.0);
        assert_eq!(base_delay(&p, 0), Duration::from_millis(100));
        assert_eq!(base_delay(&p, 1), Duration::from_millis(200));
        assert_eq!(base_delay(&p, 3), Duration::from_millis(800));
        assert_eq!(base_delay(&p, 10), Duration::from_millis(2000));
    }

    #[test]
    fn test_huge_exponent_saturates_at_max() {
        let p = policy(1000, 30_000, 10.0);
        assert_eq!(base_delay(&p, u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let p = policy(1000, 60_000, 2.0);
        for _ in 0..200 {
            let d = calculate_backoff(&p, 2, &UniformJitter).as_millis();
            assert!((3600..=4400).contains(&d), "delay {} out of range", d);
        }
    }

    #[test]
    fn test_fixed_jitter_is_clamped() {
        let p = policy(1000, 60_000, 2.0);
        assert_eq!(calculate_backoff(&p, 0, &FixedJitter(1.0)), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(&p, 0, &FixedJitter(5.0)), Duration::from_millis(1100));
    }
}
