//! Retry with exponential backoff and jitter

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::{matches_any, AdvisorError, Result};

/// Decides whether a failed attempt may be retried
pub type RetryPredicate = Arc<dyn Fn(&AdvisorError) -> bool + Send + Sync>;

/// Called before each backoff sleep with (attempt, error, delay)
pub type RetryObserver = Arc<dyn Fn(u32, &AdvisorError, Duration) + Send + Sync>;

/// Share of the current delay added as random jitter
const JITTER_FACTOR: f64 = 0.3;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    retryable: Option<RetryPredicate>,
    on_retry: Option<RetryObserver>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            retryable: None,
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("custom_predicate", &self.retryable.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            retryable: None,
            on_retry: None,
        }
    }

    /// Replace the default classification with a custom predicate
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retryable = Some(predicate);
        self
    }

    /// Retry only errors whose message contains one of `patterns`
    pub fn with_retryable_patterns(self, patterns: Vec<String>) -> Self {
        self.with_predicate(Arc::new(move |err: &AdvisorError| {
            matches_any(&err.to_string(), patterns.as_slice())
        }))
    }

    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    fn is_retryable(&self, err: &AdvisorError) -> bool {
        match &self.retryable {
            Some(predicate) => predicate(err),
            None => err.is_transient(),
        }
    }

    /// Delay actually slept: current delay plus up to 30% jitter, capped
    fn jittered(&self, current: Duration) -> Duration {
        let jitter = rand::thread_rng().gen::<f64>() * JITTER_FACTOR * current.as_secs_f64();
        let delay = Duration::from_secs_f64(current.as_secs_f64() + jitter);
        delay.min(self.max_delay)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.backoff_multiplier.max(1.0);
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. The last error is returned on failure.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay.min(self.max_delay);
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.is_retryable(&err) {
                return Err(err);
            }

            if attempt >= max_attempts {
                error!("All {} attempts failed: {}", max_attempts, err);
                return Err(err);
            }

            let actual = self.jittered(delay);
            warn!(
                "Attempt {}/{} failed: {}. Retrying in {}ms",
                attempt,
                max_attempts,
                err,
                actual.as_millis()
            );
            if let Some(observer) = &self.on_retry {
                observer(attempt, &err, actual);
            }

            tokio::time::sleep(actual).await;
            delay = self.next_delay(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_two_timeouts() {
        let policy = quick_policy().with_retryable_patterns(vec!["timeout".to_string()]);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AdvisorError::Timeout {
                        name: "groq".to_string(),
                        elapsed_ms: 10,
                    })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 10,
            ..quick_policy()
        };
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AdvisorError::Api {
                    status: 401,
                    message: "invalid api key".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(AdvisorError::Api { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = quick_policy();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(AdvisorError::Network(format!("connection reset #{}", n)))
            })
            .await;

        match result {
            Err(AdvisorError::Network(message)) => assert_eq!(message, "connection reset #3"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_observer_sees_each_retry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let policy = quick_policy().with_observer(Arc::new(move |attempt: u32, _err: &AdvisorError, delay: Duration| {
            sink.lock().unwrap().push((attempt, delay));
        }));

        let _: Result<()> = policy
            .execute(|| async { Err(AdvisorError::Network("503".to_string())) })
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
        assert!(seen.iter().all(|(_, delay)| *delay <= Duration::from_millis(5)));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let delay = policy.jittered(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1300));
        }
    }

    #[test]
    fn test_jitter_capped_at_max_delay() {
        let policy = RetryPolicy::default();
        let delay = policy.jittered(Duration::from_millis(10_000));
        assert_eq!(delay, Duration::from_millis(10_000));
    }

    #[test]
    fn test_backoff_growth_capped() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(delay.as_millis());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, vec![1000, 2000, 4000, 8000, 10_000]);
    }
}
