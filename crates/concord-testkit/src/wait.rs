//! Polling helpers for asserting asynchronous propagation.

use std::future::Future;
use std::time::Duration;

/// Interval between checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Default bound used by `eventually_default`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `check` until it returns `true` or `timeout` elapses.
///
/// Returns the final check result.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// `eventually` with `DEFAULT_TIMEOUT`
pub async fn eventually_default<F, Fut>(check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    eventually(DEFAULT_TIMEOUT, check).await
}

/// Let spawned tasks on the current runtime make progress
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(POLL_INTERVAL).await;
}
