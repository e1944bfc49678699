//! Bounded retry of commit conflicts

use std::future::Future;

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::types::*;

/// Run `attempt` until it stops failing with `LedgerError::Conflict`.
///
/// Each attempt must re-read the state it validates against. After
/// `policy.max_attempts` conflicts the error is surfaced as
/// `LedgerError::Transient`; every other outcome is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt().await {
            Err(LedgerError::Conflict(reason)) => {
                if attempts >= policy.max_attempts {
                    warn!(operation, attempts, %reason, "commit conflicts exhausted retries");
                    return Err(LedgerError::Transient {
                        operation: operation.to_string(),
                        attempts,
                    });
                }
                let delay = policy.delay_for(attempts);
                debug!(
                    operation,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "commit conflict, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&policy(5), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LedgerError::Conflict("busy".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_transient() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: LedgerResult<()> = with_retry(&policy(3), "post", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::Conflict("busy".to_string()))
        })
        .await;

        assert_eq!(
            result,
            Err(LedgerError::Transient {
                operation: "post".to_string(),
                attempts: 3
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: LedgerResult<()> = with_retry(&policy(5), "post", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::EmptyEntry)
        })
        .await;

        assert_eq!(result, Err(LedgerError::EmptyEntry));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
