//! Fixed-delay retry policy for the statement source

use std::time::Duration;

/// How long to insist on a window that keeps failing
///
/// The budget is per window: it resets as soon as a window is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// total attempts per window, `None` for no limit
    pub max_attempts: Option<usize>,
    /// time spent on one window before giving up, `None` for no limit
    pub max_elapsed: Option<Duration>,
    /// pause between two attempts
    pub backoff: Duration,
    /// whether 4xx answers other than 429 are retried like rate limits
    pub retry_client_errors: bool,
}

impl RetryPolicy {
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

    /// Retry forever with a fixed `backoff`
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            backoff,
            retry_client_errors: true,
        }
    }

    /// Zero means "no limit" for both bounds
    pub fn new(max_attempts: usize, max_elapsed: Duration, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts).filter(|&n| n > 0),
            max_elapsed: Some(max_elapsed).filter(|d| !d.is_zero()),
            backoff,
            retry_client_errors: true,
        }
    }

    pub fn with_client_errors(mut self, retry: bool) -> Self {
        self.retry_client_errors = retry;
        self
    }

    /// Whether one more attempt may be made after `failures` consecutive
    /// failures that took `elapsed` so far
    pub fn allows(&self, failures: usize, elapsed: Duration) -> bool {
        let attempts_left = self.max_attempts.map_or(true, |max| failures < max);
        let time_left = self
            .max_elapsed
            .map_or(true, |max| elapsed.saturating_add(self.backoff) <= max);
        attempts_left && time_left
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_BACKOFF)
    }
}

/// Blocking pause between attempts
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unbounded_always_allows() {
        let policy = RetryPolicy::default();
        assert!(policy.allows(1, Duration::ZERO));
        assert!(policy.allows(1_000_000, Duration::from_secs(86400 * 365)));
        assert_eq!(policy.backoff, Duration::from_secs(10));
    }

    #[test]
    fn zero_means_unbounded() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.max_elapsed, None);
    }

    #[test]
    fn attempts_bound() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::from_secs(1));
        assert!(policy.allows(1, Duration::ZERO));
        assert!(policy.allows(2, Duration::ZERO));
        assert!(!policy.allows(3, Duration::ZERO));
    }

    #[test]
    fn elapsed_bound_counts_next_pause() {
        let policy = RetryPolicy::new(0, Duration::from_secs(30), Duration::from_secs(10));
        assert!(policy.allows(5, Duration::from_secs(20)));
        assert!(!policy.allows(5, Duration::from_secs(21)));
    }
}
