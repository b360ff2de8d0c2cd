//! Retry with exponential back-off for marketplace API calls.
//!
//! Rate limits, network failures, and 5xx responses are retried. Everything
//! else (bad ids, auth failures, unparseable bodies) is returned at once.

use std::future::Future;
use std::time::Duration;

use crate::error::MarketplaceError;

fn is_retriable(err: &MarketplaceError) -> bool {
    match err {
        MarketplaceError::RateLimited { .. } | MarketplaceError::Http(_) => true,
        MarketplaceError::UnexpectedStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Executes `operation`, retrying transient failures up to `max_retries`
/// additional times.
///
/// The wait before retry `n` (1-based) is `backoff_base_secs * 2^(n-1)`
/// seconds, so with `max_retries = 3` and a base of 2s the operation runs at
/// most 4 times with sleeps of 2s, 4s, and 8s in between.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, MarketplaceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketplaceError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        let delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %err,
            "transient marketplace error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        attempt += 1;
    }
}

/// Seconds from a `Retry-After` header, defaulting to one.
pub(crate) fn retry_after_secs(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
}
