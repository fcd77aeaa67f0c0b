//! Operation Executor Module
//!
//! Composes optional validation, caching and retry around an asynchronous
//! unit of work and returns a uniform result envelope.
//!
//! # Stage order
//! 1. Validation rules, all of them, aborting before any work if one fails
//! 2. Cache lookup through the [`CacheManager`], which runs the (possibly
//!    retried) work only on a miss
//! 3. Retry alone when no cache key is set
//! 4. A single direct call otherwise

mod operation;
mod result;
mod validation;

pub use operation::Operation;
pub use result::{ExecutionStage, OperationError, OperationMetadata, OperationResult};
pub use validation::{FnRule, LengthRule, ValidationIssue, ValidationReport, ValidationRule};

use std::future::Future;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::monitoring::Monitor;
use crate::retry::RetryPolicy;

/// Entry point for running operations against a shared cache and monitor.
#[derive(Clone)]
pub struct OperationExecutor {
    monitor: Arc<dyn Monitor>,
    cache: CacheManager,
    retry_policy: RetryPolicy,
}

impl OperationExecutor {
    pub fn new(monitor: Arc<dyn Monitor>, cache: CacheManager) -> Self {
        Self {
            monitor,
            cache,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the policy used by [`Operation::with_default_retry`].
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Starts building an operation around `work`.
    pub fn operation<T, E, F, Fut>(&self, work: F) -> Operation<'_, T, E, F>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Operation::new(self, work)
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl std::fmt::Debug for OperationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationExecutor")
            .field("cache", &self.cache)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::config::CacheConfig;
    use crate::monitoring::InMemoryMonitor;
    use crate::retry::{RetryStrategy, TransportError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn executor() -> (OperationExecutor, Arc<InMemoryMonitor>) {
        let monitor = Arc::new(InMemoryMonitor::new());
        let cache = CacheManager::from_config(&CacheConfig::default(), monitor.clone());
        (OperationExecutor::new(monitor.clone(), cache), monitor)
    }

    fn fast_retry(max_attempts: u32) -> RetryStrategy<TransportError> {
        RetryStrategy::new(
            RetryPolicy::new(max_attempts)
                .base_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(2))
                .max_jitter(Duration::ZERO),
        )
    }

    fn failing_rule(field: &'static str) -> FnRule<impl Fn() -> ValidationReport + Send + Sync> {
        FnRule::new(move || {
            let mut report = ValidationReport::valid();
            report.push(field, "INVALID", format!("{field} is invalid"));
            report
        })
    }

    #[tokio::test]
    async fn test_direct_call_runs_once() {
        let (executor, monitor) = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .operation(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransportError>(42u32)
            })
            .execute()
            .await;

        assert!(result.is_success());
        assert_eq!(result.data(), Some(&42));
        assert_eq!(result.metadata.stage, ExecutionStage::Direct);
        assert!(!result.metadata.span_id.as_str().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.spans_named("business.operation").len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_work_and_cache() {
        let (executor, monitor) = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .operation(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransportError>(1u32)
            })
            .with_cache("validated", CacheOptions::new())
            .with_rule(failing_rule("name"))
            .with_rule(failing_rule("price"))
            .execute()
            .await;

        assert!(!result.is_success());
        assert_eq!(result.metadata.stage, ExecutionStage::Validating);
        let issues = result.error().and_then(|e| e.issues()).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!executor.cache().store().read().await.contains_key("validated"));
        assert!(monitor.metric("cache.miss").is_none());
    }

    #[tokio::test]
    async fn test_failed_report_without_issues_rejects() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .operation(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransportError>(1u32)
            })
            .with_rule(FnRule::new(ValidationReport::failed))
            .execute()
            .await;

        assert!(!result.is_success());
        assert_eq!(result.metadata.stage, ExecutionStage::Validating);
        let issues = result.error().and_then(|e| e.issues()).unwrap();
        assert!(issues.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_passing_validation_runs_work() {
        let (executor, _) = executor();

        let result = executor
            .operation(|| async { Ok::<_, TransportError>("ok".to_string()) })
            .with_validation(vec![Arc::new(LengthRule::new(
                "name",
                Some("lamp".into()),
                1,
                10,
            )) as Arc<dyn ValidationRule>])
            .execute()
            .await;

        assert_eq!(result.into_result().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_work() {
        let (executor, monitor) = executor();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result = executor
                .operation(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TransportError>(vec![1u8, 2, 3])
                })
                .with_cache("numbers", CacheOptions::new().tag("demo"))
                .execute()
                .await;
            assert_eq!(result.data(), Some(&vec![1u8, 2, 3]));
            assert_eq!(result.metadata.stage, ExecutionStage::Caching);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.metric_sum("cache.hit"), 1.0);
        assert_eq!(monitor.spans_named("business.operation").len(), 2);
    }

    #[tokio::test]
    async fn test_cache_wraps_retry() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .operation(|| async {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(TransportError::Network("reset".into()))
                } else {
                    Ok("fresh".to_string())
                }
            })
            .with_cache("flaky", CacheOptions::new())
            .with_retry(fast_retry(3))
            .execute()
            .await;

        assert_eq!(result.data().map(String::as_str), Some("fresh"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let cached: Option<String> = executor.cache().get("flaky").await.unwrap();
        assert_eq!(cached.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_original_error() {
        let (executor, monitor) = executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .operation(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TransportError::Status {
                    status: 503,
                    message: "unavailable".into(),
                })
            })
            .with_retry(fast_retry(3))
            .execute()
            .await;

        assert_eq!(result.metadata.stage, ExecutionStage::Retrying);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.into_result() {
            Err(OperationError::Failed(TransportError::Status { status, .. })) => {
                assert_eq!(status, 503)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(monitor.metric_sum("operation.failure"), 1.0);
        assert_eq!(monitor.spans_named("business.operation").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_work_is_not_cached() {
        let (executor, _) = executor();

        let result = executor
            .operation(|| async { Err::<u32, _>(TransportError::Network("down".into())) })
            .with_cache("never", CacheOptions::new())
            .execute()
            .await;

        assert!(matches!(result.error(), Some(OperationError::Failed(_))));
        assert!(!executor.cache().store().read().await.contains_key("never"));
    }

    #[tokio::test]
    async fn test_default_retry_uses_executor_policy() {
        let (executor, _) = executor();
        let executor = executor.with_retry_policy(
            RetryPolicy::new(2)
                .base_delay(Duration::from_millis(1))
                .max_jitter(Duration::ZERO),
        );
        let calls = AtomicU32::new(0);

        let result = executor
            .operation(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TransportError::Timeout(Duration::from_secs(1)))
            })
            .with_default_retry()
            .execute()
            .await;

        assert!(!result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
