//! Error types shared across the crate
//!
//! Provides the cache and container error taxonomies using thiserror.

use serde_json::{json, Value};
use thiserror::Error;

// == Cache Error Code ==
/// Machine-readable reason attached to every [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheErrorCode {
    /// A single value is larger than the effective size limit
    SizeLimitExceeded,
    GetFailed,
    SetFailed,
    DeleteFailed,
    TagInvalidationFailed,
    TagsInvalidationFailed,
    PatternInvalidationFailed,
    ClearFailed,
    MaintenanceFailed,
}

impl CacheErrorCode {
    /// Returns the snake_case code reported to monitoring.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheErrorCode::SizeLimitExceeded => "size_limit_exceeded",
            CacheErrorCode::GetFailed => "get_failed",
            CacheErrorCode::SetFailed => "set_failed",
            CacheErrorCode::DeleteFailed => "delete_failed",
            CacheErrorCode::TagInvalidationFailed => "tag_invalidation_failed",
            CacheErrorCode::TagsInvalidationFailed => "tags_invalidation_failed",
            CacheErrorCode::PatternInvalidationFailed => "pattern_invalidation_failed",
            CacheErrorCode::ClearFailed => "clear_failed",
            CacheErrorCode::MaintenanceFailed => "maintenance_failed",
        }
    }
}

impl std::fmt::Display for CacheErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Error ==
/// Failure of a cache store or cache manager operation.
///
/// Side effects performed before the failure are not rolled back.
#[derive(Error, Debug, Clone)]
#[error("{message} ({code})")]
pub struct CacheError {
    pub code: CacheErrorCode,
    pub message: String,
    /// Free-form context such as the key, tag or sizes involved
    pub metadata: Value,
}

impl CacheError {
    pub fn new(code: CacheErrorCode, message: impl Into<String>, metadata: Value) -> Self {
        Self {
            code,
            message: message.into(),
            metadata,
        }
    }

    /// Builds the error returned when a value cannot fit under the size limit.
    pub fn size_limit_exceeded(key: &str, size: usize, max_size: usize) -> Self {
        Self::new(
            CacheErrorCode::SizeLimitExceeded,
            "Value exceeds size limit",
            json!({ "key": key, "size": size, "maxSize": max_size }),
        )
    }

    /// Wraps a serialization failure for the given key.
    pub fn serialization(code: CacheErrorCode, key: &str, err: &serde_json::Error) -> Self {
        Self::new(code, err.to_string(), json!({ "key": key }))
    }

    /// Wraps an invalid invalidation pattern.
    pub fn invalid_pattern(pattern: &str, err: &regex::Error) -> Self {
        Self::new(
            CacheErrorCode::PatternInvalidationFailed,
            err.to_string(),
            json!({ "pattern": pattern }),
        )
    }
}

// == Container Error ==
/// Failure to resolve a service from the dependency container.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// No provider is registered for the token
    #[error("No provider registered for '{token}'")]
    ServiceNotFound { token: String },

    /// A token was requested while it was already being resolved
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// The resolution chain grew past the configured maximum depth
    #[error("Maximum dependency depth of {max_depth} exceeded while resolving '{token}'")]
    DepthExceeded { token: String, max_depth: usize },

    /// The instance exists but is not of the requested type
    #[error("Service '{token}' is not a {expected}")]
    TypeMismatch { token: String, expected: &'static str },

    /// Only an empty placeholder is available for the token
    #[error("Service '{token}' resolved to an empty placeholder")]
    Placeholder { token: String },

    /// A declared dependency has no registration
    #[error("Service '{token}' declares unregistered dependency '{dependency}'")]
    MissingDependency { token: String, dependency: String },

    /// The factory itself failed
    #[error("Factory for '{token}' failed: {source}")]
    FactoryFailed {
        token: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ContainerError {
    /// Returns the token the error is about, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            ContainerError::ServiceNotFound { token }
            | ContainerError::DepthExceeded { token, .. }
            | ContainerError::TypeMismatch { token, .. }
            | ContainerError::Placeholder { token }
            | ContainerError::MissingDependency { token, .. }
            | ContainerError::FactoryFailed { token, .. } => Some(token),
            ContainerError::CircularDependency { chain } => chain.first().map(String::as_str),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display_includes_code() {
        let err = CacheError::size_limit_exceeded("product:42", 10, 5);
        assert_eq!(err.to_string(), "Value exceeds size limit (size_limit_exceeded)");
        assert_eq!(err.metadata["key"], "product:42");
        assert_eq!(err.metadata["maxSize"], 5);
    }

    #[test]
    fn test_circular_dependency_display() {
        let err = ContainerError::CircularDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
        assert_eq!(err.token(), Some("a"));
    }

    #[test]
    fn test_factory_failed_keeps_source() {
        let err = ContainerError::FactoryFailed {
            token: "db".into(),
            source: anyhow::anyhow!("connection refused"),
        };
        assert!(err.to_string().contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
