use crate::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS};
use crate::types::{ObservedError, PrismError, Result};
use std::future::Future;
use std::time::Duration;

/// Bounded retry for upstream calls. Only network failures and 5xx
/// responses are retried; everything else surfaces on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    pub async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(val) => return Ok(val),
                Err(e) if attempts < self.max_attempts && is_retryable(&e) => {
                    let delay = self.backoff(attempts);
                    tracing::warn!(
                        "[⚙️  -> ☁️ ] Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts,
                        self.max_attempts,
                        e,
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    if is_retryable(&e) {
                        tracing::error!(
                            "[⚙️  -> ☁️ ] Giving up after {} attempts: {}",
                            attempts,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self, attempts: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let base_delay = self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempts - 1));
        // ±25% jitter
        let jitter_range = base_delay / 4;
        let jitter = if jitter_range > 0 {
            fastrand::i64(-(jitter_range as i64)..jitter_range as i64)
        } else {
            0
        };
        Duration::from_millis((base_delay as i64 + jitter).max(1) as u64)
    }
}

pub fn is_retryable(err: &ObservedError) -> bool {
    match &err.inner {
        PrismError::Network(_) => true,
        PrismError::Upstream(status, _) => status.is_server_error(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retries_server_errors_up_to_bound() {
        let policy = RetryPolicy::new(3, 0);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<()> = policy
            .execute_with_retry(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PrismError::Upstream(StatusCode::SERVICE_UNAVAILABLE, "busy".into()).into())
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(e) => assert!(matches!(e.inner, PrismError::Upstream(StatusCode::SERVICE_UNAVAILABLE, _))),
            Ok(_) => panic!("Expected upstream error"),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, 0);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<()> = policy
            .execute_with_retry(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PrismError::Upstream(StatusCode::BAD_REQUEST, "nope".into()).into())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::new(3, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = policy
            .execute_with_retry(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(PrismError::Upstream(StatusCode::BAD_GATEWAY, "flaky".into()).into())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        match result {
            Ok(v) => assert_eq!(v, 7),
            Err(e) => panic!("Expected recovery, got {}", e),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_conversation_and_parse_failures_are_terminal() {
        assert!(!is_retryable(&PrismError::ConversationCreate("no".into()).into()));
        assert!(!is_retryable(&PrismError::Parse("bad".into()).into()));
    }
}
