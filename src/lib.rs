//! Keystone - resilience and caching substrate
//!
//! An in-memory cache with TTL expiry, tag invalidation and priority
//! eviction, a retry strategy with exponential backoff, an operation executor
//! composing validation, caching and retry, and a dependency container that
//! wires them together.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod monitoring;
pub mod retry;
pub mod tasks;

pub use bootstrap::register_core_services;
pub use cache::{CacheManager, CacheOptions, CacheStore};
pub use config::{CacheConfig, Config};
pub use container::{Container, ContainerOptions, Resolver, ServiceOptions};
pub use error::{CacheError, CacheErrorCode, ContainerError};
pub use executor::{OperationError, OperationExecutor, OperationResult};
pub use monitoring::{InMemoryMonitor, Monitor, NoopMonitor, TracingMonitor};
pub use retry::{RetryPolicy, RetryStrategy, RetryableError, TransportError};
pub use tasks::spawn_maintenance_task;
