//! Bounded fixed-interval retry
//!
//! The only retry loop in the pipeline: the fetch-and-annotate stage wraps
//! its asset GET in this helper to ride out object-storage propagation delay
//! after upload. Exhausting the ceiling surfaces the last error to the
//! caller, which fails the stage terminally.

use std::future::Future;
use std::time::Duration;

/// Retry policy: a fixed number of attempts with a fixed wait in between
///
/// The wait is between attempts, not after the last one, so a policy of
/// 5 attempts at 2 s blocks the worker for at most ~8 s of sleeping.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Drive `op` until it succeeds or the attempt ceiling is reached
    ///
    /// Every failed attempt is logged at warn level with the attempt count.
    /// Returns the final attempt's error on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "{} failed; attempts exhausted",
                        what
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "{} failed; retrying in {:?}",
                        what,
                        self.interval
                    );
                    tokio::time::sleep(self.interval).await;
                    attempt += 1;
                }
            }
        }
    }
}
