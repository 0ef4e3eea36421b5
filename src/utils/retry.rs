// Retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Run `operation` up to `max_attempts` times, doubling the delay after each
/// failure starting from `base_delay` (capped at 32x).
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts.max(1) {
                    return Err(error);
                }

                let delay = base_delay * 2u32.pow((attempt - 1).min(5));
                warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "Retrying after failure");
                sleep(delay).await;
            }
        }
    }
}
