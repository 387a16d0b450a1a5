//! Exponential backoff for fallible async operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Retries `op` with exponential backoff while `retryable` accepts the error.
///
/// `op` receives the 1-based attempt number. At most `attempts` calls are
/// made; the delay doubles after every failed attempt. A non-retryable
/// error is returned immediately.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_async<F, Fut, T, E, R>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && retryable(&e) => {
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
