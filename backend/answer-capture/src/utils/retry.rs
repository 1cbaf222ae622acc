use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff: attempt `n` failing waits `base * 2^n`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            jitter_max: None,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay slept after the failed attempt with index `attempt` (0-based).
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        let backoff = self
            .base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff);
        std::cmp::min(backoff, self.max_backoff)
    }

    fn jitter(&self) -> Duration {
        match self.jitter_max {
            Some(jitter_max) => {
                let jitter_ms = jitter_max.as_millis() as u64;
                if jitter_ms == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
                }
            }
            None => Duration::ZERO,
        }
    }
}

/// Runs `f` until it succeeds or the attempt budget is spent. The error of the
/// last attempt is returned to the caller.
pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_async_when(config, f, |_| true).await
}

/// Like [`retry_async_with_config`], but stops early when `should_retry`
/// rejects an error. The controller itself knows nothing about error kinds.
pub async fn retry_async_when<F, Fut, T, E, P>(
    config: RetryConfig,
    mut f: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0usize;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt + 1 >= max_attempts || !should_retry(&e) {
                    return Err(e);
                }

                let wait = config.backoff_for(attempt) + config.jitter();
                tracing::debug!(
                    attempt,
                    delay_ms = wait.as_millis() as u64,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_retries() {
        let counter = AtomicUsize::new(0);

        let res: Result<usize, &'static str> = retry_async_with_config(fast(3), || async {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("fail")
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_fails_after_max_attempts() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> = retry_async_with_config(fast(2), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("always fail")
        })
        .await;

        assert_eq!(res, Err("always fail"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_from_one_second() {
        let started = Instant::now();
        let attempts = Mutex::new(Vec::new());

        let res: Result<(), usize> = retry_async_with_config(RetryConfig::default(), || {
            let mut seen = attempts.lock().unwrap();
            seen.push(started.elapsed());
            let n = seen.len();
            async move { Err(n) }
        })
        .await;

        // the last attempt's error propagates
        assert_eq!(res, Err(3));
        let seen = attempts.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Duration::ZERO);
        assert_close(seen[1] - seen[0], Duration::from_millis(1000));
        assert_close(seen[2] - seen[1], Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn predicate_stops_retrying_early() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> = retry_async_when(
            fast(5),
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("permanent")
            },
            |e| *e != "permanent",
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = RetryConfig {
            max_backoff: Duration::from_secs(5),
            ..RetryConfig::default()
        };

        assert_eq!(cfg.backoff_for(0), Duration::from_secs(1));
        assert_eq!(cfg.backoff_for(2), Duration::from_secs(4));
        assert_eq!(cfg.backoff_for(3), Duration::from_secs(5));
        assert_eq!(cfg.backoff_for(40), Duration::from_secs(5));
    }
}
