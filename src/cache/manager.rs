//! Cache Manager Module
//!
//! Get-or-populate semantics and monitored invalidation over a shared
//! [`CacheStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::cache::{CacheOptions, CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::monitoring::{Monitor, SpanId};

// == Cache Manager ==
/// Shared front door to the cache.
///
/// The store lock is never held across an await on caller code, so the size
/// and tag invariants are never observable half-updated. Concurrent misses on
/// the same key are not coalesced: each caller runs its own factory.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<RwLock<CacheStore>>,
    monitor: Arc<dyn Monitor>,
}

impl CacheManager {
    pub fn new(store: CacheStore, monitor: Arc<dyn Monitor>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            monitor,
        }
    }

    pub fn from_config(config: &CacheConfig, monitor: Arc<dyn Monitor>) -> Self {
        Self::new(CacheStore::new(config.clone()), monitor)
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        Arc::clone(&self.store)
    }

    // == Get Or Set ==
    /// Returns the cached value for `key`, or runs `factory` once, stores its
    /// result and returns it.
    ///
    /// The factory is not invoked on a hit. Store failures are converted into
    /// the caller's error type; factory errors are returned untouched and
    /// nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &CacheOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let span = self
            .monitor
            .start_span("cache.getOrSet", json!({ "key": key }));

        let cached = self.store.write().await.get::<T>(key);
        match cached {
            Ok(Some(value)) => {
                self.record_lookup(&span, key, true);
                self.monitor
                    .end_span(&span, json!({ "hit": true, "success": true }));
                return Ok(value);
            }
            Ok(None) => self.record_lookup(&span, key, false),
            Err(err) => {
                self.report_error(&span, &err);
                self.monitor
                    .end_span(&span, json!({ "hit": false, "success": false }));
                return Err(err.into());
            }
        }

        let started = Instant::now();
        let produced = factory().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.monitor.record("cache.factory_duration_ms", elapsed_ms);
        self.monitor.add_event(
            &span,
            "cache.factory",
            json!({ "key": key, "durationMs": elapsed_ms, "success": produced.is_ok() }),
        );

        let value = match produced {
            Ok(value) => value,
            Err(err) => {
                self.monitor.record("cache.error", 1.0);
                self.monitor
                    .end_span(&span, json!({ "hit": false, "success": false }));
                return Err(err);
            }
        };

        let stored = {
            let mut store = self.store.write().await;
            let result = store.set(key, &value, options);
            (result, store.total_size())
        };
        match stored {
            (Ok(()), total_size) => {
                self.monitor.record("cache.size", total_size as f64);
                self.monitor
                    .end_span(&span, json!({ "hit": false, "success": true }));
                Ok(value)
            }
            (Err(err), _) => {
                self.report_error(&span, &err);
                self.monitor
                    .end_span(&span, json!({ "hit": false, "success": false }));
                Err(err.into())
            }
        }
    }

    fn record_lookup(&self, span: &SpanId, key: &str, hit: bool) {
        let name = if hit { "cache.hit" } else { "cache.miss" };
        self.monitor.record(name, 1.0);
        self.monitor.add_event(span, name, json!({ "key": key }));
        self.monitor.debug(
            if hit { "Cache hit" } else { "Cache miss" },
            json!({ "key": key }),
        );
    }

    fn report_error(&self, span: &SpanId, err: &CacheError) {
        self.monitor.record("cache.error", 1.0);
        self.monitor.add_event(
            span,
            "cache.error",
            json!({ "code": err.code.as_str(), "message": err.message }),
        );
        self.monitor.error(
            "Cache operation failed",
            json!({ "code": err.code.as_str(), "message": err.message, "metadata": err.metadata }),
        );
    }

    // == Get / Set ==
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let span = self.monitor.start_span("cache.get", json!({ "key": key }));
        let result = self.store.write().await.get::<T>(key);
        match &result {
            Ok(found) => self.record_lookup(&span, key, found.is_some()),
            Err(err) => self.report_error(&span, err),
        }
        self.monitor.end_span(&span, json!({}));
        result
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<()> {
        let span = self.monitor.start_span("cache.set", json!({ "key": key }));
        let (result, total_size) = {
            let mut store = self.store.write().await;
            let result = store.set(key, value, options);
            (result, store.total_size())
        };
        match &result {
            Ok(()) => self.monitor.record("cache.size", total_size as f64),
            Err(err) => self.report_error(&span, err),
        }
        self.monitor.end_span(&span, json!({}));
        result
    }

    // == Delete / Invalidate ==
    /// Removes `key`. Returns whether it was present.
    pub async fn delete(&self, key: &str) -> bool {
        let span = self.monitor.start_span("cache.delete", json!({ "key": key }));
        let (removed, total_size) = {
            let mut store = self.store.write().await;
            (store.delete(key), store.total_size())
        };
        if removed {
            self.monitor.record("cache.size", total_size as f64);
            self.monitor.debug("Cache entry deleted", json!({ "key": key }));
        }
        self.monitor.end_span(&span, json!({ "removed": removed }));
        removed
    }

    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let span = self
            .monitor
            .start_span("cache.invalidateByTag", json!({ "tag": tag }));
        let (removed, total_size) = {
            let mut store = self.store.write().await;
            (store.invalidate_by_tag(tag), store.total_size())
        };
        self.report_invalidation(&span, total_size, removed, json!({ "tag": tag }));
        removed
    }

    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let names: Vec<&str> = tags.iter().map(|tag| tag.as_ref()).collect();
        let span = self
            .monitor
            .start_span("cache.invalidateByTags", json!({ "tags": names }));
        let (removed, total_size) = {
            let mut store = self.store.write().await;
            (store.invalidate_by_tags(tags), store.total_size())
        };
        self.report_invalidation(&span, total_size, removed, json!({ "tags": names }));
        removed
    }

    /// Removes every key matching the regular expression `pattern`.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let span = self
            .monitor
            .start_span("cache.invalidateByPattern", json!({ "pattern": pattern }));
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                let err = CacheError::invalid_pattern(pattern, &e);
                self.report_error(&span, &err);
                self.monitor.end_span(&span, json!({}));
                return Err(err);
            }
        };

        let (removed, total_size) = {
            let mut store = self.store.write().await;
            (store.invalidate_by_pattern(&regex), store.total_size())
        };
        self.report_invalidation(&span, total_size, removed, json!({ "pattern": pattern }));
        Ok(removed)
    }

    pub async fn clear(&self) -> usize {
        let span = self.monitor.start_span("cache.clear", json!({}));
        let cleared = self.store.write().await.clear();
        self.monitor.record("cache.size", 0.0);
        self.monitor
            .info("Cache cleared", json!({ "clearedEntries": cleared }));
        self.monitor.end_span(&span, json!({}));
        cleared
    }

    fn report_invalidation(
        &self,
        span: &SpanId,
        total_size: usize,
        removed: usize,
        mut context: serde_json::Value,
    ) {
        self.monitor.record("cache.size", total_size as f64);
        context["invalidatedCount"] = json!(removed);
        self.monitor.info("Cache entries invalidated", context);
        self.monitor.end_span(span, json!({ "invalidatedCount": removed }));
    }

    // == Maintenance ==
    /// Runs one maintenance sweep. Returns the number of entries removed.
    pub async fn maintenance(&self) -> usize {
        let span = self.monitor.start_span("cache.maintenance", json!({}));
        let (removed, remaining, total_size) = {
            let mut store = self.store.write().await;
            let removed = store.maintenance();
            (removed, store.len(), store.total_size())
        };

        if removed > 0 {
            self.monitor.record("cache.size", total_size as f64);
            self.monitor.info(
                "Cache maintenance completed",
                json!({
                    "removedEntries": removed,
                    "remainingEntries": remaining,
                    "totalSize": total_size
                }),
            );
        }
        self.monitor
            .end_span(&span, json!({ "removedEntries": removed }));
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheErrorCode;
    use crate::monitoring::InMemoryMonitor;
    use std::cell::Cell;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum FetchError {
        Cache(CacheErrorCode),
        Upstream(&'static str),
    }

    impl From<CacheError> for FetchError {
        fn from(err: CacheError) -> Self {
            FetchError::Cache(err.code)
        }
    }

    fn manager() -> (CacheManager, Arc<InMemoryMonitor>) {
        let monitor = Arc::new(InMemoryMonitor::new());
        let config = CacheConfig {
            max_size: 1024,
            ..CacheConfig::default()
        };
        (CacheManager::from_config(&config, monitor.clone()), monitor)
    }

    #[tokio::test]
    async fn test_get_or_set_populates_on_miss() {
        let (manager, monitor) = manager();
        let calls = Cell::new(0);

        let value: std::result::Result<u32, FetchError> = manager
            .get_or_set(
                "answer",
                || async {
                    calls.set(calls.get() + 1);
                    Ok(42)
                },
                &CacheOptions::new(),
            )
            .await;
        assert_eq!(value, Ok(42));

        let value: std::result::Result<u32, FetchError> = manager
            .get_or_set(
                "answer",
                || async {
                    calls.set(calls.get() + 1);
                    Ok(7)
                },
                &CacheOptions::new(),
            )
            .await;
        assert_eq!(value, Ok(42));

        assert_eq!(calls.get(), 1);
        assert_eq!(monitor.metric_sum("cache.miss"), 1.0);
        assert_eq!(monitor.metric_sum("cache.hit"), 1.0);
        assert_eq!(monitor.metric("cache.factory_duration_ms").unwrap().count, 1);

        let spans = monitor.spans_named("cache.getOrSet");
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|span| span.is_finished()));
        assert_eq!(spans[0].attributes["key"], "answer");
    }

    #[tokio::test]
    async fn test_get_or_set_factory_error_is_not_cached() {
        let (manager, monitor) = manager();

        let value: std::result::Result<u32, FetchError> = manager
            .get_or_set(
                "k",
                || async { Err(FetchError::Upstream("boom")) },
                &CacheOptions::new(),
            )
            .await;

        assert_eq!(value, Err(FetchError::Upstream("boom")));
        assert!(manager.get::<u32>("k").await.unwrap().is_none());
        assert_eq!(monitor.metric_sum("cache.error"), 1.0);
    }

    #[tokio::test]
    async fn test_get_or_set_surfaces_store_error() {
        let (manager, _) = manager();

        let value: std::result::Result<String, FetchError> = manager
            .get_or_set(
                "big",
                || async { Ok("x".repeat(2048)) },
                &CacheOptions::new(),
            )
            .await;

        assert_eq!(value, Err(FetchError::Cache(CacheErrorCode::SizeLimitExceeded)));
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_not_coalesced() {
        let (manager, _) = manager();
        let calls = Cell::new(0);
        let factory = || async {
            calls.set(calls.get() + 1);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, FetchError>(1u32)
        };

        let options = CacheOptions::new();
        let (a, b) = tokio::join!(
            manager.get_or_set("k", factory, &options),
            manager.get_or_set("k", factory, &options),
        );

        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_invalidation_delegates_to_store() {
        let (manager, monitor) = manager();
        manager
            .set("product:1", &1, &CacheOptions::new().tag("products"))
            .await
            .unwrap();
        manager
            .set("product:2", &2, &CacheOptions::new().tag("products"))
            .await
            .unwrap();
        manager.set("cart:1", &3, &CacheOptions::new().tag("carts")).await.unwrap();
        manager.set("other", &4, &CacheOptions::new()).await.unwrap();

        assert_eq!(manager.invalidate_by_tag("products").await, 2);
        assert_eq!(manager.invalidate_by_tags(&["carts", "missing"]).await, 1);
        assert_eq!(manager.invalidate_by_pattern("^oth").await.unwrap(), 1);
        assert_eq!(manager.stats().await.entry_count, 0);
        assert_eq!(monitor.logs_at(crate::monitoring::LogLevel::Info).len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_cache_error() {
        let (manager, _) = manager();
        let err = manager.invalidate_by_pattern("(unclosed").await.unwrap_err();
        assert_eq!(err.code, CacheErrorCode::PatternInvalidationFailed);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (manager, _) = manager();
        manager.set("a", &1, &CacheOptions::new()).await.unwrap();
        manager.set("b", &2, &CacheOptions::new()).await.unwrap();

        assert!(manager.delete("a").await);
        assert!(!manager.delete("a").await);
        assert_eq!(manager.clear().await, 1);
        assert_eq!(manager.stats().await.total_size, 0);
    }
}
