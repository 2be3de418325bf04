//! Exponential backoff for retrying failed saves.

use std::time::Duration;

/// Smallest step a failure can grow the interval by when `initial` is zero.
const MIN_RETRY_STEP: Duration = Duration::from_millis(1);

/// Retry pacing for snapshot saves.
///
/// Always satisfies `initial <= current <= max`. A failure doubles the
/// current interval (capped at `max`), a success resets it to `initial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    /// Creates a backoff starting at `initial`.
    ///
    /// If `max` is below `initial` it is raised to `initial`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next save attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn report_success(&mut self) {
        self.current = self.initial;
    }

    pub fn report_failure(&mut self) {
        let doubled = self.current.saturating_mul(2).max(MIN_RETRY_STEP);
        self.current = doubled.min(self.max);
    }

    /// Whether the interval has reached the cap.
    pub fn at_max(&self) -> bool {
        self.current == self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn starts_at_initial() {
        let backoff = ExponentialBackoff::new(ms(10), ms(100));
        assert_eq!(backoff.current(), ms(10));
    }

    #[test]
    fn failures_double_until_capped() {
        let mut backoff = ExponentialBackoff::new(ms(10), ms(100));

        let observed: Vec<_> = (0..5)
            .map(|_| {
                backoff.report_failure();
                backoff.current()
            })
            .collect();

        assert_eq!(observed, vec![ms(20), ms(40), ms(80), ms(100), ms(100)]);
        assert!(backoff.at_max());
    }

    #[test]
    fn success_resets_to_initial() {
        let mut backoff = ExponentialBackoff::new(ms(10), ms(100));
        backoff.report_failure();
        backoff.report_failure();

        backoff.report_success();

        assert_eq!(backoff.current(), ms(10));
    }

    #[test]
    fn max_below_initial_is_raised() {
        let mut backoff = ExponentialBackoff::new(ms(50), ms(20));
        assert_eq!(backoff.max(), ms(50));

        backoff.report_failure();
        assert_eq!(backoff.current(), ms(50));
    }

    #[test]
    fn zero_initial_still_grows_on_failure() {
        let mut backoff = ExponentialBackoff::new(Duration::ZERO, ms(8));

        backoff.report_failure();
        assert_eq!(backoff.current(), ms(1));
        backoff.report_failure();
        assert_eq!(backoff.current(), ms(2));

        backoff.report_success();
        assert_eq!(backoff.current(), Duration::ZERO);
    }
}
