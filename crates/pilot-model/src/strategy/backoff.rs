use serde::{Deserialize, Serialize};

use crate::JitterStrategy;

/// Retry policy for transient store and staging failures.
///
/// Delay for attempt `n` (0-based) is `first_ms * factor^n`, clamped to `max_ms`,
/// then randomized according to `jitter`. At most `max_attempts` calls are made in total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffStrategy {
    pub jitter: JitterStrategy,
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            jitter: JitterStrategy::Full,
            first_ms: 200,
            max_ms: 10_000,
            factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl BackoffStrategy {
    /// Policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let raw = (self.first_ms as f64) * factor.powi(attempt.min(64) as i32);
        if !raw.is_finite() || raw >= self.max_ms as f64 {
            self.max_ms
        } else {
            raw as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let b = BackoffStrategy {
            jitter: JitterStrategy::None,
            first_ms: 100,
            max_ms: 1_000,
            factor: 2.0,
            max_attempts: 10,
        };
        assert_eq!(b.base_delay_ms(0), 100);
        assert_eq!(b.base_delay_ms(1), 200);
        assert_eq!(b.base_delay_ms(3), 800);
        assert_eq!(b.base_delay_ms(4), 1_000);
        assert_eq!(b.base_delay_ms(60), 1_000);
    }

    #[test]
    fn bogus_factor_falls_back_to_constant() {
        let b = BackoffStrategy {
            factor: 0.5,
            ..BackoffStrategy::default()
        };
        assert_eq!(b.base_delay_ms(5), b.first_ms);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let b: BackoffStrategy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(b.max_attempts, 2);
        assert_eq!(b.first_ms, 200);
        assert_eq!(b.jitter, JitterStrategy::Full);
    }
}
