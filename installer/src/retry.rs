//! Retry policy shared by release lookups and artefact downloads.
//!
//! A [`RetryPolicy`] bundles the attempt ceiling and the delay schedule. The
//! caller supplies the retryable-error predicate at each call site, so the
//! lookup layer can refuse to retry malformed payloads while the fetcher
//! retries every failure it knows about.

use std::time::Duration;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Shape of the delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed,
    /// The delay doubles before every retry.
    Exponential,
}

/// Attempt ceiling and delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy whose delay doubles after every failed attempt,
    /// capped at `max_delay`.
    ///
    /// `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: initial_delay.min(max_delay),
            max_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Creates a policy that waits `delay` between every attempt.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Returns the attempt ceiling, including the first attempt.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the schedule shape.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Returns the delay to wait after the given failed attempt (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use envoy_ai_installer::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(3));
    /// assert_eq!(policy.delay_after(1), Duration::from_secs(1));
    /// assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    /// assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    /// ```
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(31);
                self.initial_delay
                    .saturating_mul(1_u32 << exponent)
                    .min(self.max_delay)
            }
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt ceiling is reached.
    ///
    /// `operation` receives the 1-based attempt number. The last error is
    /// returned when all attempts fail.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub fn run<T, E, F, P>(
        &self,
        sleeper: &dyn Sleeper,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "attempt {attempt}/{} failed: {err}; retrying in {}ms",
                        self.max_attempts,
                        delay.as_millis()
                    );
                    sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Blocks the current thread between attempts.
///
/// Tests substitute an implementation that records the requested delays.
pub trait Sleeper {
    /// Waits for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps with [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingSleeper;
    use rstest::rstest;

    #[derive(Debug, PartialEq, Eq)]
    enum Failure {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn is_transient(failure: &Failure) -> bool {
        *failure == Failure::Transient
    }

    #[rstest]
    #[case::first(1, 1)]
    #[case::second(2, 2)]
    #[case::third(3, 4)]
    #[case::capped(10, 30)]
    fn exponential_schedule_doubles_and_caps(#[case] attempt: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(attempt), Duration::from_secs(expected_secs));
    }

    #[test]
    fn exponential_schedule_is_monotonic() {
        let policy = RetryPolicy::exponential(40, Duration::from_millis(250), Duration::from_secs(20));
        let delays: Vec<_> = (1..40).map(|attempt| policy.delay_after(attempt)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|delay| *delay <= Duration::from_secs(20)));
    }

    #[test]
    fn fixed_schedule_repeats_the_same_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), policy.delay_after(2));
        assert_eq!(policy.backoff(), Backoff::Fixed);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::fixed(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let sleeper = RecordingSleeper::default();
        let result = RetryPolicy::default().run(
            &sleeper,
            |attempt| if attempt < 3 { Err(Failure::Transient) } else { Ok(attempt) },
            is_transient,
        );
        assert_eq!(result, Ok(3));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn stops_at_the_attempt_ceiling() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result: Result<(), Failure> = RetryPolicy::default().run(
            &sleeper,
            |_| {
                calls += 1;
                Err(Failure::Transient)
            },
            is_transient,
        );
        assert_eq!(result, Err(Failure::Transient));
        assert_eq!(calls, 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[test]
    fn non_retryable_errors_fail_immediately() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result: Result<(), Failure> = RetryPolicy::default().run(
            &sleeper,
            |_| {
                calls += 1;
                Err(Failure::Permanent)
            },
            is_transient,
        );
        assert_eq!(result, Err(Failure::Permanent));
        assert_eq!(calls, 1);
        assert!(sleeper.delays().is_empty());
    }
}
