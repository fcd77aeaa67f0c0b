//! Operation builder: attach validation, caching and retry to a unit of work,
//! then run the composed pipeline once.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::cache::CacheOptions;
use crate::executor::result::{ExecutionStage, OperationError, OperationMetadata, OperationResult};
use crate::executor::validation::{ValidationReport, ValidationRule};
use crate::executor::OperationExecutor;
use crate::monitoring::SpanId;
use crate::retry::{RetryStrategy, RetryableError};

const OPERATION_SPAN: &str = "business.operation";

/// A unit of work plus the stages configured around it.
///
/// Built with [`OperationExecutor::operation`]; nothing runs until
/// [`execute`](Operation::execute) is awaited.
pub struct Operation<'a, T, E, F> {
    executor: &'a OperationExecutor,
    work: F,
    cache: Option<(String, CacheOptions)>,
    retry: Option<RetryStrategy<E>>,
    rules: Vec<Arc<dyn ValidationRule>>,
    _output: PhantomData<fn() -> T>,
}

impl<'a, T, E, F, Fut> Operation<'a, T, E, F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    pub(crate) fn new(executor: &'a OperationExecutor, work: F) -> Self {
        Self {
            executor,
            work,
            cache: None,
            retry: None,
            rules: Vec::new(),
            _output: PhantomData,
        }
    }

    /// Serve the result from the cache under `key`, populating it on a miss.
    pub fn with_cache(mut self, key: impl Into<String>, options: CacheOptions) -> Self {
        self.cache = Some((key.into(), options));
        self
    }

    pub fn with_retry(mut self, strategy: RetryStrategy<E>) -> Self {
        self.retry = Some(strategy);
        self
    }

    /// Retry with the executor's configured policy and the default predicate.
    pub fn with_default_retry(self) -> Self
    where
        E: RetryableError + 'static,
    {
        let strategy = RetryStrategy::new(self.executor.retry_policy().clone());
        self.with_retry(strategy)
    }

    pub fn with_validation<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ValidationRule>>,
    {
        self.rules.extend(rules);
        self
    }

    pub fn with_rule<R: ValidationRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Runs validation, then the cache (wrapping retry), retry alone, or a
    /// single direct call. Never panics on failure; every path ends in the
    /// result envelope.
    pub async fn execute(self) -> OperationResult<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: fmt::Display,
    {
        let Operation {
            executor,
            work,
            cache,
            retry,
            rules,
            ..
        } = self;
        let monitor = executor.monitor();
        let started = Instant::now();

        let span = monitor.start_span(
            OPERATION_SPAN,
            json!({
                "cacheKey": cache.as_ref().map(|(key, _)| key.as_str()),
                "retry": retry.is_some(),
                "rules": rules.len(),
            }),
        );

        let mut stage = ExecutionStage::Validating;
        let outcome = run(executor, &span, &mut stage, work, cache, retry, rules).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(_) => monitor.record("operation.success", 1.0),
            Err(err) => {
                monitor.record("operation.failure", 1.0);
                monitor.error(
                    "Operation failed",
                    json!({
                        "spanId": span.as_str(),
                        "stage": stage.as_str(),
                        "kind": err.kind(),
                        "error": err.to_string(),
                    }),
                );
            }
        }
        monitor.record("operation.duration_ms", elapsed.as_secs_f64() * 1000.0);
        monitor.end_span(
            &span,
            json!({ "success": outcome.is_ok(), "stage": stage.as_str() }),
        );

        OperationResult {
            outcome,
            metadata: OperationMetadata {
                span_id: span,
                timestamp: Utc::now(),
                stage,
                elapsed,
            },
        }
    }
}

async fn run<T, E, F, Fut>(
    executor: &OperationExecutor,
    span: &SpanId,
    stage: &mut ExecutionStage,
    mut work: F,
    cache: Option<(String, CacheOptions)>,
    retry: Option<RetryStrategy<E>>,
    rules: Vec<Arc<dyn ValidationRule>>,
) -> Result<T, OperationError<E>>
where
    T: Serialize + DeserializeOwned,
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let monitor = executor.monitor();

    if !rules.is_empty() {
        let report = validate(&rules).await;
        monitor.add_event(
            span,
            "operation.validated",
            json!({ "rules": rules.len(), "issues": report.issues().len() }),
        );
        if !report.is_valid() {
            return Err(OperationError::Validation(report.into_issues()));
        }
    }

    match (cache, retry) {
        (Some((key, options)), retry) => {
            *stage = ExecutionStage::Caching;
            executor
                .cache()
                .get_or_set(
                    &key,
                    move || async move {
                        let mut work = work;
                        let produced = match retry {
                            Some(strategy) => strategy.execute(work).await,
                            None => work().await,
                        };
                        produced.map_err(OperationError::Failed)
                    },
                    &options,
                )
                .await
        }
        (None, Some(strategy)) => {
            *stage = ExecutionStage::Retrying;
            strategy.execute(work).await.map_err(OperationError::Failed)
        }
        (None, None) => {
            *stage = ExecutionStage::Direct;
            work().await.map_err(OperationError::Failed)
        }
    }
}

/// Runs every rule and folds their reports into one.
async fn validate(rules: &[Arc<dyn ValidationRule>]) -> ValidationReport {
    let mut combined = ValidationReport::valid();
    for rule in rules {
        combined.merge(rule.validate().await);
    }
    combined
}
