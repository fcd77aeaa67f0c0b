//! Uniform result envelope returned by every executed operation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::CacheError;
use crate::executor::validation::ValidationIssue;
use crate::monitoring::SpanId;

/// Last state an invocation reached before completing or failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStage {
    Validating,
    Caching,
    Retrying,
    Direct,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Caching => "caching",
            Self::Retrying => "retrying",
            Self::Direct => "direct",
        }
    }
}

/// Attached to every result, successful or not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    pub span_id: SpanId,
    pub timestamp: DateTime<Utc>,
    pub stage: ExecutionStage,
    pub elapsed: Duration,
}

#[derive(Error, Debug)]
pub enum OperationError<E> {
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    #[error("cache failure: {0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Failed(E),
}

impl<E> OperationError<E> {
    /// Short classification used in logs and span attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Cache(_) => "cache",
            Self::Failed(_) => "operation",
        }
    }

    pub fn issues(&self) -> Option<&[ValidationIssue]> {
        match self {
            Self::Validation(issues) => Some(issues),
            _ => None,
        }
    }

    /// The unit of work's own error, if that is what failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Outcome of one executed operation plus its metadata.
#[derive(Debug)]
pub struct OperationResult<T, E> {
    pub outcome: Result<T, OperationError<E>>,
    pub metadata: OperationMetadata,
}

impl<T, E> OperationResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&OperationError<E>> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, OperationError<E>> {
        self.outcome
    }
}
