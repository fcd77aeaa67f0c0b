//! Core service wiring.
//!
//! Registers the monitor, cache, retry policy and executor in a
//! [`Container`] so application code can resolve a ready-made
//! [`OperationExecutor`].

use std::sync::Arc;

use tracing::info;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::container::{Container, Resolver, ServiceOptions};
use crate::error::ContainerError;
use crate::executor::OperationExecutor;
use crate::monitoring::{Monitor, TracingMonitor};
use crate::retry::RetryPolicy;

/// Tokens under which the core services are registered.
pub mod tokens {
    /// `Arc<dyn Monitor>`
    pub const MONITOR: &str = "monitor";
    /// `CacheManager`
    pub const CACHE: &str = "cache";
    /// `RetryPolicy`
    pub const RETRY_POLICY: &str = "retry_policy";
    /// `OperationExecutor`
    pub const EXECUTOR: &str = "executor";
}

/// Registers the core services as singletons.
///
/// The monitor defaults to [`TracingMonitor`]; register another
/// `Arc<dyn Monitor>` under [`tokens::MONITOR`] before the first resolution
/// to replace it.
pub fn register_core_services(container: &Container, config: &Config) {
    container.register(
        tokens::MONITOR,
        |_: &Resolver<'_>| Ok(Arc::new(TracingMonitor::new()) as Arc<dyn Monitor>),
        ServiceOptions::new().singleton(),
    );

    let cache_config = config.cache.clone();
    container.register(
        tokens::CACHE,
        move |r: &Resolver<'_>| {
            let monitor = r.resolve::<Arc<dyn Monitor>>(tokens::MONITOR)?;
            Ok(CacheManager::from_config(&cache_config, Arc::clone(&*monitor)))
        },
        ServiceOptions::new()
            .singleton()
            .depends_on(tokens::MONITOR),
    );

    container.register_instance(tokens::RETRY_POLICY, config.retry.clone());

    container.register(
        tokens::EXECUTOR,
        |r: &Resolver<'_>| {
            let monitor = r.resolve::<Arc<dyn Monitor>>(tokens::MONITOR)?;
            let cache = r.resolve::<CacheManager>(tokens::CACHE)?;
            let policy = r.resolve::<RetryPolicy>(tokens::RETRY_POLICY)?;
            Ok(OperationExecutor::new(Arc::clone(&*monitor), CacheManager::clone(&cache))
                .with_retry_policy(RetryPolicy::clone(&policy)))
        },
        ServiceOptions::new()
            .singleton()
            .depends_on(tokens::MONITOR)
            .depends_on(tokens::CACHE)
            .depends_on(tokens::RETRY_POLICY),
    );

    info!(
        services = ?container.registered_tokens(),
        "Core services registered"
    );
}

/// Resolves the shared executor.
pub fn executor(container: &Container) -> Result<Arc<OperationExecutor>, ContainerError> {
    container.resolve::<OperationExecutor>(tokens::EXECUTOR)
}

/// Resolves the shared cache manager.
pub fn cache(container: &Container) -> Result<Arc<CacheManager>, ContainerError> {
    container.resolve::<CacheManager>(tokens::CACHE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::InMemoryMonitor;

    #[test]
    fn test_core_services_resolve() {
        let container = Container::default();
        register_core_services(&container, &Config::default());

        assert_eq!(
            container.registered_tokens(),
            ["cache", "executor", "monitor", "retry_policy"]
        );
        assert!(container.validate_dependencies().is_ok());

        let first = executor(&container).unwrap();
        let second = executor(&container).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.retry_policy(), &RetryPolicy::default());
    }

    #[tokio::test]
    async fn test_executor_shares_cache_singleton() {
        let container = Container::default();
        register_core_services(&container, &Config::default());
        let monitor = Arc::new(InMemoryMonitor::new());
        container.register_instance(tokens::MONITOR, monitor.clone() as Arc<dyn Monitor>);

        let executor = executor(&container).unwrap();
        executor.cache().set("shared", &1u32, &Default::default()).await.unwrap();

        let cache = cache(&container).unwrap();
        assert_eq!(cache.get::<u32>("shared").await.unwrap(), Some(1));
        assert!(monitor.span_count() > 0);
    }
}
