//! Time-bounded, instrumented store calls.

use std::future::Future;
use std::time::{Duration, Instant};
use tablebook_core::store::StoreError;
use tablebook_runtime::metrics::StoreMetrics;

/// Run one store call under `limit`, recording its latency and failures.
///
/// An elapsed deadline becomes [`StoreError::Timeout`].
pub(crate) async fn store_call<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            #[allow(clippy::cast_possible_truncation)] // Timeouts are far below u64::MAX ms
            let millis = limit.as_millis() as u64;
            Err(StoreError::Timeout(millis))
        },
    };
    StoreMetrics::record_call(operation, start.elapsed());

    if let Err(error) = &result {
        StoreMetrics::record_error(operation);
        tracing::warn!(operation, %error, "Store call failed");
    }
    result
}
