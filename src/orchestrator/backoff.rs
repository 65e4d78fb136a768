//! Bounded exponential backoff used by both polling loops.

use std::time::Duration;

/// `delay(n) = min(initial_delay * factor^n, max_delay)` for `n` in
/// `0..max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Waiting for the control plane to assign a public URL.
    pub const DEPLOYMENT_URL: Self = Self {
        initial_delay: Duration::from_millis(1_000),
        factor: 1.5,
        max_delay: Duration::from_millis(30_000),
        max_attempts: 12,
    };

    /// Waiting for the instance health endpoint.
    pub const READINESS: Self = Self {
        initial_delay: Duration::from_millis(1_000),
        factor: 1.5,
        max_delay: Duration::from_millis(30_000),
        max_attempts: 30,
    };

    /// Delay before (or after) attempt `attempt`, truncated to whole
    /// milliseconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = initial_ms * self.factor.powi(exponent);
        let capped = if scaled.is_finite() {
            scaled.min(max_ms)
        } else {
            max_ms
        };
        Duration::from_millis(capped.floor() as u64)
    }

    /// The full schedule, one delay per attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|attempt| self.delay_for(attempt))
    }

    /// Upper bound on total time spent sleeping.
    pub fn total_delay(&self) -> Duration {
        self.delays().sum()
    }

    #[cfg(test)]
    pub(crate) fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            factor: 1.0,
            max_delay: Duration::from_millis(1),
            max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn deployment_schedule_matches_reference_values() {
        let delays: Vec<u64> = BackoffPolicy::DEPLOYMENT_URL
            .delays()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![
                1000, 1500, 2250, 3375, 5062, 7593, 11390, 17085, 25628, 30000, 30000, 30000
            ]
        );
    }

    #[test]
    fn delays_are_monotonic_and_capped() {
        let policy = BackoffPolicy::READINESS;
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(delays.len(), 30);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(delays[29], Duration::from_secs(30));
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_max() {
        let policy = BackoffPolicy::DEPLOYMENT_URL;
        assert_eq!(policy.delay_for(10_000), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }
}
