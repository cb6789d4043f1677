//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - An elapsed deadline becomes `ProviderFailure::Timeout`, classified like any other failure

use std::future::Future;
use std::time::Duration;

use crate::resilience::classifier::ProviderFailure;

/// Bound a provider call with `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderFailure>
where
    F: Future<Output = Result<T, ProviderFailure>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderFailure::Timeout {
            message: format!("provider call exceeded {}ms", limit.as_millis()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_is_timeout_failure() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ProviderFailure::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_completed_call_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, ProviderFailure>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
