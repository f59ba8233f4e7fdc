//! Capped exponential reconnect backoff

use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First delay, and the delay after a reset
    pub floor: Duration,
    /// Largest delay
    pub ceiling: Duration,
    /// Growth per attempt
    pub factor: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
            factor: 2,
        }
    }
}

/// Delay generator for reconnect attempts
///
/// Yields `floor`, `floor * factor`, `floor * factor^2`, ... capped at
/// `ceiling`. The sequence never decreases until `reset`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let config = BackoffConfig {
            floor: config.floor.min(config.ceiling),
            factor: config.factor.max(1),
            ..config
        };
        Self {
            next: config.floor,
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.attempts += 1;
        self.next = delay
            .checked_mul(self.config.factor)
            .unwrap_or(self.config.ceiling)
            .min(self.config.ceiling);
        delay
    }

    /// Delay `next_delay` would return, without advancing
    pub fn peek(&self) -> Duration {
        self.next
    }

    /// Delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.next = self.config.floor;
        self.attempts = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_default_sequence() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]);
        assert_eq!(backoff.attempts(), 9);
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_floor_above_ceiling_clamped() {
        let mut backoff = Backoff::new(BackoffConfig {
            floor: Duration::from_secs(60),
            ceiling: Duration::from_secs(10),
            factor: 0,
        });
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    proptest! {
        #[test]
        fn prop_non_decreasing_and_bounded(
            floor_ms in 1u64..5_000,
            ceiling_ms in 1u64..120_000,
            factor in 1u32..8,
            steps in 1usize..64,
        ) {
            let config = BackoffConfig {
                floor: Duration::from_millis(floor_ms),
                ceiling: Duration::from_millis(ceiling_ms),
                factor,
            };
            let mut backoff = Backoff::new(config);
            let mut last = Duration::ZERO;
            for _ in 0..steps {
                let delay = backoff.next_delay();
                prop_assert!(delay >= last);
                prop_assert!(delay <= config.ceiling);
                last = delay;
            }
            backoff.reset();
            prop_assert_eq!(backoff.next_delay(), config.floor.min(config.ceiling));
        }
    }
}
