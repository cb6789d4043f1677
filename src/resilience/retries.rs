//! Retry logic.
//!
//! # Responsibilities
//! - Hold the retry policy (bound, delays, retryable kinds)
//! - Execute an operation, classifying each failed attempt independently
//! - Sleep with jittered exponential backoff between attempts
//!
//! # Design Decisions
//! - ContentPolicy and kinds outside the allow-list fail immediately, no delay
//! - `retry_count` never exceeds `max_retries`; the operation runs at most `max_retries + 1` times
//! - The final error carries the retry count reached

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, Jitter, UniformJitter};
use crate::resilience::classifier::{
    ClassifiedError, ErrorClassifier, ErrorKind, FailureContext, ProviderFailure,
};

/// Backoff policy for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_kinds: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            retryable_kinds: ErrorKind::transient().into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        kind != ErrorKind::ContentPolicy && self.retryable_kinds.contains(&kind)
    }
}

/// Suspends the calling task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryCoordinator {
    classifier: Arc<ErrorClassifier>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
}

impl RetryCoordinator {
    pub fn new(classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            classifier,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(UniformJitter),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Run `operation` until it succeeds, fails with a non-retryable kind, or
    /// exhausts `policy.max_retries`.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        context: &FailureContext,
        mut operation: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        let provider = context.provider.as_deref().unwrap_or("unknown");
        let mut retry_count: u32 = 0;

        loop {
            metrics::record_provider_attempt(provider);

            let failure = match operation().await {
                Ok(value) => {
                    if retry_count > 0 {
                        tracing::info!(
                            provider,
                            retries = retry_count,
                            "Provider call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let classified = self
                .classifier
                .classify(&failure, context)
                .with_retry_count(retry_count);
            let kind = classified.kind();

            if !policy.is_retryable(kind) {
                tracing::debug!(provider, kind = %kind, "Failure kind is not retryable");
                return Err(classified);
            }

            if retry_count >= policy.max_retries {
                tracing::warn!(
                    provider,
                    kind = %kind,
                    retries = retry_count,
                    "Retry budget exhausted"
                );
                return Err(classified);
            }

            let delay = calculate_backoff(policy, retry_count, self.jitter.as_ref());
            tracing::info!(
                provider,
                kind = %kind,
                attempt = retry_count + 1,
                delay = ?delay,
                "Retrying provider call"
            );
            metrics::record_retry(provider, kind.as_str());

            self.sleeper.sleep(delay).await;
            retry_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::backoff::FixedJitter;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    fn coordinator() -> (RetryCoordinator, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let coordinator = RetryCoordinator::new(Arc::new(ErrorClassifier::default()))
            .with_sleeper(sleeper.clone())
            .with_jitter(Arc::new(FixedJitter(1.0)));
        (coordinator, sleeper)
    }

    fn refused() -> ProviderFailure {
        ProviderFailure::Transport {
            code: Some(io::ErrorKind::ConnectionRefused),
            message: "connection refused".into(),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_runs_n_plus_one_times() {
        for n in [0u32, 1, 3, 5] {
            let (coordinator, sleeper) = coordinator();
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy { max_retries: n, ..RetryPolicy::default() };

            let result: Result<(), _> = coordinator
                .execute_with_retry(&policy, &FailureContext::new("openai"), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(refused()) }
                })
                .await;

            let err = result.unwrap_err();
            assert_eq!(calls.load(Ordering::SeqCst), n + 1);
            assert_eq!(err.retry_count(), n);
            assert_eq!(err.kind(), ErrorKind::Network);
            assert_eq!(sleeper.delays.lock().unwrap().len(), n as usize);
        }
    }

    #[tokio::test]
    async fn test_content_policy_runs_once() {
        let (coordinator, sleeper) = coordinator();
        let calls = AtomicU32::new(0);
        let mut policy = RetryPolicy { max_retries: 10, ..RetryPolicy::default() };
        // Even an allow-list that names it cannot make ContentPolicy retryable.
        policy.retryable_kinds.insert(ErrorKind::ContentPolicy);

        let result: Result<(), _> = coordinator
            .execute_with_retry(&policy, &FailureContext::new("openai"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderFailure::Status {
                        status: 400,
                        body: "content_policy_violation".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ContentPolicy);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kind_outside_allow_list_fails_immediately() {
        let (coordinator, _) = coordinator();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            retryable_kinds: [ErrorKind::Timeout].into_iter().collect(),
            ..RetryPolicy::default()
        };

        let result: Result<(), _> = coordinator
            .execute_with_retry(&policy, &FailureContext::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderFailure::Status { status: 429, body: String::new() }) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().retry_count(), 0);
    }

    #[tokio::test]
    async fn test_delays_follow_exponential_schedule() {
        let (coordinator, sleeper) = coordinator();
        let policy = RetryPolicy {
            max_retries: 4,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            backoff_factor: 2.0,
            ..RetryPolicy::default()
        };

        let _: Result<(), _> = coordinator
            .execute_with_retry(&policy, &FailureContext::default(), || async {
                Err(ProviderFailure::Timeout { message: "slow".into() })
            })
            .await;

        let delays: Vec<u128> = sleeper.delays.lock().unwrap().iter().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000]);
    }

    #[tokio::test]
    async fn test_each_attempt_classified_independently() {
        let (coordinator, _) = coordinator();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = coordinator
            .execute_with_retry(&policy, &FailureContext::default(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderFailure::Timeout { message: "slow".into() })
                    } else {
                        Err(ProviderFailure::Status { status: 401, body: "bad key".into() })
                    }
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.retry_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let (coordinator, _) = coordinator();
        let calls = AtomicU32::new(0);

        let result = coordinator
            .execute_with_retry(&RetryPolicy::default(), &FailureContext::default(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderFailure::Status { status: 503, body: "unavailable".into() })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_suspends_task() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(2)).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
