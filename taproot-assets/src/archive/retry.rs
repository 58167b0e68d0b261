//! Randomized exponential backoff for transient store errors.

use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use super::ArchiveError;

/// Default number of attempts for a single store operation.
pub const DEFAULT_NUM_RETRIES: u32 = 10;
/// Base delay between attempts before jitter and doubling.
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(40);
/// Cap on the delay between attempts.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(3);
/// Default bound on the total time spent on one store operation.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest power of two applied to the base delay.
const MAX_DOUBLINGS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub num_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Retrying stops once this much time has passed since the first attempt.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            num_retries: DEFAULT_NUM_RETRIES,
            initial_delay: DEFAULT_INITIAL_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Delay before retry number `attempt` (0 based): a random value in
/// `[base/2, 3*base/2)`, doubled once per attempt and capped at `cap`.
pub fn retry_delay<R: Rng + ?Sized>(
    attempt: u32,
    base: Duration,
    cap: Duration,
    rng: &mut R,
) -> Duration {
    let base_nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
    if base_nanos == 0 {
        return Duration::ZERO;
    }
    let initial = u128::from(base_nanos / 2) + u128::from(rng.gen_range(0..base_nanos));
    let actual = initial.saturating_mul(1u128 << attempt.min(MAX_DOUBLINGS));
    if actual > cap.as_nanos() {
        return cap;
    }
    // Bounded by the cap, which fits a Duration.
    Duration::from_nanos(u64::try_from(actual).unwrap_or(u64::MAX))
}

/// Runs `op` until it succeeds, fails with a non-retryable error, runs out
/// of attempts or exceeds the timeout.
pub fn execute_with_retry<T, F>(config: &RetryConfig, mut op: F) -> Result<T, ArchiveError>
where
    F: FnMut() -> Result<T, ArchiveError>,
{
    let started = Instant::now();
    let mut rng = rand::thread_rng();
    for attempt in 0..config.num_retries {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                let delay = retry_delay(attempt, config.initial_delay, config.max_delay, &mut rng);
                if started.elapsed() + delay > config.timeout {
                    return Err(ArchiveError::Timeout(config.timeout));
                }
                log::trace!(
                    "Retrying archive operation after {}, attempt={}, delay={:?}",
                    err,
                    attempt,
                    delay
                );
                thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
    Err(ArchiveError::RetriesExceeded(config.num_retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn delay_stays_within_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Duration::from_millis(40);
        let cap = Duration::from_secs(3);
        for _ in 0..100 {
            let delay = retry_delay(0, base, cap, &mut rng);
            assert!(delay >= Duration::from_millis(20));
            assert!(delay < Duration::from_millis(60));
        }
        for _ in 0..100 {
            let delay = retry_delay(2, base, cap, &mut rng);
            assert!(delay >= Duration::from_millis(80));
            assert!(delay < Duration::from_millis(240));
        }
    }

    #[test]
    fn delay_is_capped() {
        let mut rng = StdRng::seed_from_u64(1);
        let cap = Duration::from_secs(3);
        assert_eq!(retry_delay(10, Duration::from_millis(40), cap, &mut rng), cap);
        assert_eq!(retry_delay(u32::MAX, Duration::from_secs(1), cap, &mut rng), cap);
        assert_eq!(
            retry_delay(3, Duration::ZERO, cap, &mut rng),
            Duration::ZERO
        );
    }

    fn fast_config(num_retries: u32) -> RetryConfig {
        RetryConfig {
            num_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn retries_transient_errors_only() {
        let mut calls = 0;
        let result = execute_with_retry(&fast_config(5), || {
            calls += 1;
            if calls < 3 {
                Err(ArchiveError::Serialization("conflict".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);

        let mut calls = 0;
        let result: Result<(), _> = execute_with_retry(&fast_config(5), || {
            calls += 1;
            Err(ArchiveError::Backend("disk full".into()))
        });
        assert!(matches!(result, Err(ArchiveError::Backend(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn gives_up_after_num_retries() {
        let mut calls = 0;
        let result: Result<(), _> = execute_with_retry(&fast_config(4), || {
            calls += 1;
            Err(ArchiveError::Deadlock("locked".into()))
        });
        assert!(matches!(result, Err(ArchiveError::RetriesExceeded(4))));
        assert_eq!(calls, 4);
    }

    #[test]
    fn stops_at_timeout() {
        let config = RetryConfig {
            num_retries: 100,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(20),
            timeout: Duration::from_millis(15),
        };
        let result: Result<(), _> =
            execute_with_retry(&config, || Err(ArchiveError::Deadlock("locked".into())));
        assert!(matches!(result, Err(ArchiveError::Timeout(_))));
    }
}
