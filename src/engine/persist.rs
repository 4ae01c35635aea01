use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::observability::{STORE_CALL_DURATION_SECONDS, STORE_RETRIES_TOTAL};
use crate::store::StoreError;

/// Bounds on every store call: per-attempt timeout, attempt count, and a
/// linear backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(200),
        }
    }
}

/// Run a store call under `policy`. Only transient failures are retried;
/// the last error is returned once attempts run out.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    call: &'static str,
    key: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let started = Instant::now();
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(r) => r,
            Err(_) => Err(StoreError::Timeout),
        };
        metrics::histogram!(STORE_CALL_DURATION_SECONDS, "call" => call)
            .record(started.elapsed().as_secs_f64());

        match result {
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("store {call} of {key} failed (attempt {attempt}/{attempts}): {e}");
                metrics::counter!(STORE_RETRIES_TOTAL, "call" => call).increment(1);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
