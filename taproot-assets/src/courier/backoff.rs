//! Exponential backoff with jitter for courier deliveries.

use std::future::Future;
use std::time::Duration;

use crate::archive::retry::retry_delay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Base wait before the second attempt.
    pub initial_backoff: Duration,
    /// Cap on any single wait.
    pub max_backoff: Duration,
    /// Attempts before giving up, at least one is always made.
    pub num_tries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            num_tries: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Runs `op` until it succeeds or the tries are used up, and returns the
    /// last error in that case. `on_wait` sees every wait before it starts.
    pub async fn exec<T, E, F, Fut, W>(&self, mut op: F, mut on_wait: W) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        W: FnMut(u32, Duration),
    {
        let tries = self.config.num_tries.max(1);
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;
            if attempt >= tries {
                log::warn!("Giving up after {} attempts: {}", attempt, err);
                return Err(err);
            }
            let wait = retry_delay(
                attempt - 1,
                self.config.initial_backoff,
                self.config.max_backoff,
                &mut rand::thread_rng(),
            );
            log::debug!(
                "Attempt {} failed: {}, retrying in {:?}",
                attempt,
                err,
                wait
            );
            on_wait(attempt, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(num_tries: u32) -> Backoff {
        Backoff::new(BackoffConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(150),
            num_tries,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let mut calls = 0;
        let mut waits = Vec::new();
        let result: Result<u32, String> = backoff(5)
            .exec(
                || {
                    calls += 1;
                    let calls = calls;
                    async move {
                        if calls < 3 {
                            Err(format!("fail {}", calls))
                        } else {
                            Ok(calls)
                        }
                    }
                },
                |attempt, wait| waits.push((attempt, wait)),
            )
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(waits.len(), 2);
        assert!(waits.iter().all(|(_, wait)| *wait <= Duration::from_millis(150)));
        assert_eq!(waits[0].0, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let mut calls = 0;
        let result: Result<(), String> = backoff(3)
            .exec(
                || {
                    calls += 1;
                    let calls = calls;
                    async move { Err(format!("fail {}", calls)) }
                },
                |_, _| {},
            )
            .await;
        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn zero_tries_still_runs_once() {
        let mut calls = 0;
        let result: Result<(), &str> = backoff(0)
            .exec(
                || {
                    calls += 1;
                    async { Err("nope") }
                },
                |_, _| {},
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
