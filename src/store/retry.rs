//! Bounded retry for transactions that lost a serialization race.
//!
//! Only [`EcommerceError::TransactionAborted`] is retried; everything else is
//! returned to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::EcommerceError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(20), max_delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self { Self { max_attempts: max_attempts.max(1), ..Self::default() } }

    /// Exponential backoff with ±20% jitter; zero before the first attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 { return Duration::ZERO; }
        let factor = 2u32.saturating_pow(attempt - 1);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        capped.mul_f64(jitter)
    }
}

pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut attempt_fn: F) -> Result<T, EcommerceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EcommerceError>>,
{
    let mut attempt = 0;
    loop {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        match attempt_fn().await {
            Ok(value) => {
                if attempt > 0 { debug!(operation, attempts = attempt + 1, "transaction succeeded after retry"); }
                return Ok(value);
            }
            Err(EcommerceError::TransactionAborted(reason)) if attempt + 1 < policy.max_attempts => {
                warn!(operation, attempt = attempt + 1, %reason, "transaction aborted, retrying");
                attempt += 1;
            }
            Err(EcommerceError::TransactionAborted(reason)) => {
                warn!(operation, attempts = attempt + 1, %reason, "transaction retries exhausted");
                return Err(EcommerceError::RetriesExhausted { operation: operation.to_string(), attempts: attempt + 1 });
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_only_aborts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy { base_delay: Duration::from_millis(1), ..RetryPolicy::with_attempts(3) };
        let result = with_retry(&policy, "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EcommerceError::TransactionAborted("conflict".into()))
            } else {
                Ok(7)
            }
        }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy { base_delay: Duration::from_millis(1), ..RetryPolicy::with_attempts(2) };
        let result: Result<(), _> = with_retry(&policy, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EcommerceError::TransactionAborted("conflict".into()))
        }).await;
        assert!(matches!(result, Err(EcommerceError::RetriesExhausted { attempts: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EcommerceError::Validation("empty cart".into()))
        }).await;
        assert!(matches!(result, Err(EcommerceError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
