//! Retry Module
//!
//! Re-runs a failing asynchronous unit of work with exponential backoff and
//! jitter. The error surfaced after the last attempt is the unit of work's
//! own error, never a retry-specific wrapper.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

// == Retry Policy ==
/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one, at least 1
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// `base_delay * 2^(attempt - 1)`, saturating. `attempt` is 1-based.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Delay to wait after failed attempt `attempt` (1-based):
    /// `min(base_delay * 2^(attempt - 1) + jitter, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.exponential_delay(attempt)
            .saturating_add(jitter)
            .min(self.max_delay)
    }
}

// == Retry Classification ==
/// Lets the default predicate classify an error.
pub trait RetryableError {
    /// HTTP-like status code carried by the error, if any
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Whether the error came from the transport (connection, DNS, timeout)
    fn is_transport_error(&self) -> bool {
        false
    }
}

/// Default retry predicate.
///
/// Retries transport failures and 5xx, 408 and 429 statuses. Every other 4xx
/// (including 401, 403 and 404) and any error with neither a status nor a
/// transport cause is final.
pub fn default_should_retry<E: RetryableError + ?Sized>(error: &E) -> bool {
    match error.status_code() {
        Some(401 | 403 | 404) => false,
        Some(408 | 429) => true,
        Some(status) if (400..500).contains(&status) => false,
        Some(status) => status >= 500,
        None => error.is_transport_error(),
    }
}

/// Error type for collaborators speaking an HTTP-like protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with a failure status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },
}

impl RetryableError for TransportError {
    fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_transport_error(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout(_))
    }
}

impl<E: RetryableError + ?Sized> RetryableError for Box<E> {
    fn status_code(&self) -> Option<u16> {
        (**self).status_code()
    }

    fn is_transport_error(&self) -> bool {
        (**self).is_transport_error()
    }
}

// == Retry Strategy ==
/// Type alias for a retry error predicate.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Policy plus a predicate deciding which errors are worth another attempt.
pub struct RetryStrategy<E> {
    policy: RetryPolicy,
    should_retry: RetryPredicate<E>,
}

impl<E> Clone for RetryStrategy<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            should_retry: Arc::clone(&self.should_retry),
        }
    }
}

impl<E> fmt::Debug for RetryStrategy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryStrategy")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<E: RetryableError + 'static> RetryStrategy<E> {
    /// Strategy using [`default_should_retry`].
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_predicate(policy, |error: &E| default_should_retry(error))
    }
}

impl<E> RetryStrategy<E> {
    pub fn with_predicate<P>(policy: RetryPolicy, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            policy,
            should_retry: Arc::new(predicate),
        }
    }

    /// Strategy that retries every error.
    pub fn always(policy: RetryPolicy) -> Self {
        Self::with_predicate(policy, |_| true)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn should_retry(&self, error: &E) -> bool {
        (self.should_retry)(error)
    }

    // == Execute ==
    /// Runs `operation` until it succeeds, the predicate rejects the error, or
    /// `max_attempts` is used up. Returns the last error unchanged.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= max_attempts {
                        warn!(attempt, max_attempts, error = %error, "Final retry attempt failed");
                        return Err(error);
                    }
                    if !self.should_retry(&error) {
                        debug!(attempt, error = %error, "Error is not retryable");
                        return Err(error);
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        delay = ?delay,
                        error = %error,
                        "Attempt failed, waiting before retry"
                    );
                    if delay > Duration::ZERO {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
