//! Bounded-timeout retry for external collaborator calls.
//!
//! Every attempt runs under its own timeout budget; transient provider
//! errors and timeouts back off exponentially and retry. A timeout
//! after the last attempt surfaces as `UpstreamTimeout`, which is
//! recoverable: the caller's conversation state is untouched and the
//! inbound event may be retried.

use leadflow_core::error::LeadflowError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const BACKOFF_BASE_MS: u64 = 100;

/// Run `op` with a per-attempt timeout, retrying transient failures.
///
/// Only `Provider` errors are treated as transient; validation and
/// other domain errors propagate immediately.
pub async fn with_retry<T, F, Fut>(
    service: &str,
    budget: Duration,
    max_attempts: u32,
    mut op: F,
) -> Result<T, LeadflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LeadflowError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let backoff = Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1));
            tokio::time::sleep(backoff).await;
        }

        match tokio::time::timeout(budget, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e @ LeadflowError::Provider(_))) => {
                warn!("{service}: attempt {} failed: {e}", attempt + 1);
                last_err = Some(e);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(
                    "{service}: attempt {} timed out after {}ms",
                    attempt + 1,
                    budget.as_millis()
                );
                last_err = Some(LeadflowError::UpstreamTimeout {
                    service: service.to_string(),
                    budget_ms: budget.as_millis() as u64,
                });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| LeadflowError::UpstreamTimeout {
        service: service.to_string(),
        budget_ms: budget.as_millis() as u64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_first_attempt() {
        let result = with_retry("svc", Duration::from_secs(1), 3, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_transient_provider_error_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry("svc", Duration::from_secs(1), 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LeadflowError::Provider("flaky".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_domain_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("svc", Duration::from_secs(1), 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LeadflowError::Validation("bad input".into())) }
        })
        .await;
        assert!(matches!(result, Err(LeadflowError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_upstream_timeout() {
        let result: Result<(), _> =
            with_retry("keyword-extractor", Duration::from_millis(5), 2, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        match result {
            Err(LeadflowError::UpstreamTimeout { service, budget_ms }) => {
                assert_eq!(service, "keyword-extractor");
                assert_eq!(budget_ms, 5);
            }
            other => panic!("expected UpstreamTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_provider_errors_surface_last_error() {
        let result: Result<(), _> = with_retry("svc", Duration::from_secs(1), 2, || async {
            Err(LeadflowError::Provider("still down".into()))
        })
        .await;
        assert!(matches!(result, Err(LeadflowError::Provider(_))));
    }
}
