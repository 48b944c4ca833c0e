use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::AppError;

/// Jittered exponential backoff for store operations that lose a race on a
/// lock or a version check. Only transient errors are retried; once the
/// attempts are spent the caller sees `ServiceUnavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let base_delay_ms = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    pub fn for_store(max_attempts: usize) -> Self {
        Self::new(max_attempts, 25, 500, 0.25)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let spread = (delay as f64 * self.jitter_pct) as i64;
        let jittered = if spread > 0 {
            delay.saturating_add_signed(rand::thread_rng().gen_range(-spread..=spread))
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    pub async fn run<F, Fut, T>(&self, operation: &'static str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(operation, attempts = attempt, "Store contention persisted: {}", err);
                        return Err(AppError::ServiceUnavailable);
                    }
                    warn!(operation, attempt, "Transient store error, retrying: {}", err);
                    sleep(self.next_delay(attempt - 1)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_store(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 25, 100, 0.0);
        let delays: Vec<_> = (0..4).map(|attempt| policy.next_delay(attempt)).collect();
        assert_eq!(delays, vec![
            Duration::from_millis(25),
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(100),
        ]);
    }

    #[tokio::test]
    async fn retries_contention_until_success() {
        let policy = RetryPolicy::new(3, 1, 1, 0.0);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy
            .run("test", |attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 { Err(AppError::ConcurrentModification) } else { Ok(attempt) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_contention_is_service_unavailable() {
        let policy = RetryPolicy::new(2, 1, 1, 0.0);
        let result: Result<(), AppError> = policy.run("test", |_| async { Err(AppError::ConcurrentModification) }).await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable)));
    }

    #[tokio::test]
    async fn domain_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, 1, 1, 0.0);
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), AppError> = policy
            .run("test", |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::CapacityExceeded("s1".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::CapacityExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
