use std::future::Future;

use cdc_config::shared::RetryConfig;
use tracing::warn;

use crate::error::CdcResult;

/// Runs `operation` until it succeeds, fails with a non transient error, or runs out of
/// attempts. The delay between attempts grows as configured in `retry`.
pub(crate) async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> CdcResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CdcResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind().is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed with a transient error, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
