//! Cache Maintenance Task
//!
//! Background task that periodically sweeps expired and stale cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns a background task that runs [`CacheManager::maintenance`] every
/// `interval`.
///
/// The task loops forever; abort the returned handle during shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_maintenance_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_maintenance_task(cache: CacheManager, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs_f64(),
            "Starting cache maintenance task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.maintenance().await;
            if removed > 0 {
                info!(removed, "Cache maintenance removed entries");
            } else {
                debug!("Cache maintenance found nothing to remove");
            }
        }
    })
}
