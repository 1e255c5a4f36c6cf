//! Fixed-delay retry for object uploads

use crate::config::Config;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first failure
    pub max_retries: u32,
    /// Pause before every retry
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(3),
        }
    }
}

impl From<&Config> for RetryConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.upload_retries,
            delay: config.upload_retry_delay(),
        }
    }
}

/// Execute an async operation with retry logic
///
/// Errors that are not retryable (authentication, configuration) are
/// returned immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(path = %label, attempt, "Retry succeeded");
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    path = %label,
                    error = %e,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = config.delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                sleep(config.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_once_then_succeed() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&fast(), "a.txt", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::connection("reset", None))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(&fast(), "a.txt", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::remote(500, "busy"))
        })
        .await;

        assert!(matches!(result, Err(Error::Remote { code: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry(&fast(), "a.txt", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::auth("expired"))
        })
        .await;

        assert!(matches!(result, Err(Error::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_delay_is_three_seconds() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _ = with_retry(&RetryConfig::default(), "a.txt", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::connection("reset", None))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
