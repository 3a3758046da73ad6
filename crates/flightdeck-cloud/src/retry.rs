//! Retry gate for throttled provider calls

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Backoff configuration for the retry gate
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Wait before the first retry
    pub initial_delay: Duration,

    /// Largest wait the gate will sit out; once the next wait would exceed
    /// it, the last error is returned
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(32),
            backoff_multiplier: 2,
        }
    }
}

impl RetryConfig {
    /// The waits the gate sits out before giving up: 500ms, 1s, ... 32s
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_delay), move |d| {
            Some(*d * self.backoff_multiplier)
        })
        .take_while(move |d| *d <= self.max_delay)
    }
}

/// Wraps provider calls, retrying retryable errors with exponential backoff.
///
/// There is no jitter and no attempt limit beyond the delay ceiling.
#[derive(Debug, Clone, Default)]
pub struct RetryGate {
    config: RetryConfig,
}

impl RetryGate {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying while it fails with a retryable error
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut wait = self.config.initial_delay;
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    if wait > self.config.max_delay {
                        tracing::debug!(
                            attempts = attempt,
                            "Giving up on throttled call: {}",
                            err
                        );
                        return Err(err);
                    }
                    tracing::debug!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Retrying throttled call: {}",
                        err
                    );
                    tokio::time::sleep(wait).await;
                    wait *= self.config.backoff_multiplier;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn throttled() -> CloudError {
        CloudError::from_response(Some(400), Some("ThrottlingException"), "Rate exceeded")
    }

    #[test]
    fn test_schedule() {
        let waits: Vec<u64> = RetryConfig::default()
            .schedule()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(waits, vec![500, 1000, 2000, 4000, 8000, 16000, 32000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_success() {
        let gate = RetryGate::default();
        let start = Instant::now();
        let attempts: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

        let recorded = attempts.clone();
        let result = gate
            .execute(|| {
                let recorded = recorded.clone();
                async move {
                    let mut seen = recorded.lock().unwrap();
                    seen.push(start.elapsed());
                    if seen.len() <= 4 {
                        Err(throttled())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let seen = attempts.lock().unwrap().clone();
        let gaps: Vec<u64> = seen
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![500, 1000, 2000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_ceiling() {
        let gate = RetryGate::default();
        let start = Instant::now();
        let calls = Arc::new(Mutex::new(0u32));

        let counter = calls.clone();
        let result: Result<()> = gate
            .execute(|| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(throttled())
                }
            })
            .await;

        assert!(matches!(result, Err(CloudError::Throttling { .. })));
        // one initial attempt plus one per scheduled wait
        assert_eq!(*calls.lock().unwrap(), 8);
        assert_eq!(start.elapsed(), Duration::from_millis(63_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let gate = RetryGate::default();
        let start = Instant::now();
        let calls = Arc::new(Mutex::new(0u32));

        let counter = calls.clone();
        let result: Result<()> = gate
            .execute(|| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(CloudError::from_response(
                        Some(400),
                        Some("ValidationError"),
                        "Stack does not exist",
                    ))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_retried() {
        let gate = RetryGate::default();
        let calls = Arc::new(Mutex::new(0u32));

        let counter = calls.clone();
        let result = gate
            .execute(|| {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    if *n == 1 {
                        Err(CloudError::from_response(Some(503), None, "unavailable"))
                    } else {
                        Ok(*n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }
}
