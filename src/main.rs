//! Keystone demo process
//!
//! Wires the core services, runs a sample cached-and-retried operation and
//! keeps the cache maintenance task alive until shutdown.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keystone::bootstrap::{self, register_core_services};
use keystone::executor::LengthRule;
use keystone::{
    CacheManager, CacheOptions, Config, Container, RetryPolicy, RetryStrategy, TransportError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    id: u32,
    name: String,
    price_cents: u64,
}

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Register and eagerly initialize the core services
/// 4. Start the background cache maintenance task
/// 5. Run a sample operation twice (miss, then hit)
/// 6. Wait for SIGINT/SIGTERM and stop the task
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "keystone=info", can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keystone=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Keystone");

    let config = Config::from_env();
    info!(
        "Configuration loaded: default_ttl={:?}, max_size={}, max_entries={}, retry_attempts={}",
        config.cache.default_ttl,
        config.cache.max_size,
        config.cache.max_entries,
        config.retry.max_attempts
    );

    let container = Container::new(config.container.clone());
    register_core_services(&container, &config);
    container.validate_dependencies()?;
    container.initialize_all().await?;

    let cache = bootstrap::cache(&container)?;
    let maintenance_handle = keystone::spawn_maintenance_task(
        CacheManager::clone(&cache),
        config.cache.maintenance_interval,
    );
    info!("Background maintenance task started");

    let executor = bootstrap::executor(&container)?;
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::new(config.retry.max_attempts)
        .base_delay(Duration::from_millis(50))
        .max_delay(Duration::from_millis(200));

    for round in 1..=2 {
        let result = executor
            .operation(|| async {
                // First call fails to exercise the retry path
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(TransportError::Network("connection reset".into()));
                }
                Ok(Product {
                    id: 1,
                    name: "Desk lamp".into(),
                    price_cents: 2_499,
                })
            })
            .with_rule(LengthRule::new("name", Some("Desk lamp".into()), 2, 100))
            .with_cache("product:1", CacheOptions::new().tag("products"))
            .with_retry(RetryStrategy::new(policy.clone()))
            .execute()
            .await;

        match &result.outcome {
            Ok(product) => info!(
                round,
                span_id = %result.metadata.span_id,
                stage = result.metadata.stage.as_str(),
                ?product,
                "Sample operation succeeded"
            ),
            Err(err) => warn!(round, error = %err, "Sample operation failed"),
        }
    }
    info!(
        attempts = attempts.load(Ordering::SeqCst),
        stats = ?cache.stats().await,
        "Sample operations complete"
    );

    shutdown_signal(maintenance_handle).await;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// maintenance task.
async fn shutdown_signal(maintenance_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    maintenance_handle.abort();
    warn!("Maintenance task aborted");
}
