//! Retry-with-sleep loop for notification delivery.

use std::future::Future;
use std::time::Duration;

use crate::error::NotifyError;

/// Runs `operation`, retrying transient failures up to `max_retries` more
/// times. The sleep before retry `n` is `base_delay_ms * n`.
///
/// # Errors
///
/// Returns the last error when it is permanent or retries are exhausted.
pub async fn retry_with_delay<T, F, Fut>(
    max_retries: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<T, NotifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NotifyError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() || attempt >= max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay_ms = base_delay_ms.saturating_mul(u64::from(attempt));
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %err,
            "notification delivery failed, retrying"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> NotifyError {
        NotifyError::PushRejected {
            status: 503,
            body: "busy".to_owned(),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_delay(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("delivered")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_delay(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_delay(5, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(NotifyError::SubscriptionGone { status: 410 })
            }
        })
        .await;
        assert!(matches!(result, Err(NotifyError::SubscriptionGone { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
