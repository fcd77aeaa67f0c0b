//! Cache Store Module
//!
//! Main cache engine: key/entry storage with TTL expiry, a tag index for bulk
//! invalidation, byte-size accounting and priority-based eviction.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheErrorCode, Result};

// == Cache Options ==
/// Per-call settings for [`CacheStore::set`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheOptions {
    /// Time to live, the store default when `None`
    pub ttl: Option<Duration>,
    /// Tags for bulk invalidation
    pub tags: Vec<String>,
    /// Per-value size limit in bytes, the store capacity when `None`
    pub max_size: Option<usize>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }
}

// == Cache Store ==
/// In-memory cache storage.
///
/// Invariants kept by every mutation:
/// - `total_size` equals the sum of `size` over all stored entries
/// - a key is listed under a tag in `tag_index` iff its entry carries that
///   tag, and no tag bucket is ever left empty
#[derive(Debug)]
pub struct CacheStore {
    /// Key-entry storage
    entries: HashMap<String, CacheEntry>,
    /// Tag to keys index
    tag_index: HashMap<String, HashSet<String>>,
    /// Sum of all entry sizes in bytes
    total_size: usize,
    /// Performance statistics
    stats: CacheStats,
    config: CacheConfig,
    /// Next insertion sequence number
    next_seq: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new empty CacheStore.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            tag_index: HashMap::new(),
            total_size: 0,
            stats: CacheStats::new(),
            config,
            next_seq: 0,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Get ==
    /// Retrieves and deserializes a value by key.
    ///
    /// Returns `Ok(None)` when the key is absent or expired; an expired entry
    /// is removed as a side effect. A hit bumps the entry's hit counter and
    /// access time.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return Ok(None);
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            return Ok(None);
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        let value = entry
            .decode()
            .map_err(|e| CacheError::serialization(CacheErrorCode::GetFailed, key, &e))?;
        entry.touch();
        self.stats.record_hit();
        Ok(Some(value))
    }

    // == Peek ==
    /// Returns the live entry for `key` without counting a read.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|entry| !entry.is_expired())
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// Fails with `SizeLimitExceeded`, storing nothing, when the serialized
    /// value is larger than the effective limit (`options.max_size` or the
    /// store capacity). Otherwise low-priority entries are evicted until the
    /// value fits, then the entry is inserted with a fresh TTL, tag set and
    /// hit counter.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<()> {
        let serialized = serde_json::to_string(value)
            .map_err(|e| CacheError::serialization(CacheErrorCode::SetFailed, key, &e))?;
        let size = serialized.len();

        let max_size = options.max_size.unwrap_or(self.config.max_size);
        if size > max_size {
            return Err(CacheError::size_limit_exceeded(key, size, max_size));
        }

        self.ensure_capacity(key, size);

        // Drop the previous entry so its size and tags leave the books first
        self.remove_entry(key);

        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = CacheEntry::new(serialized, ttl, options.tags.clone(), seq);

        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.total_size += entry.size;
        self.entries.insert(key.to_string(), entry);

        Ok(())
    }

    // == Capacity ==
    fn has_room(&self, key: &str, required: usize) -> bool {
        let replaced = self.entries.get(key).map(|e| e.size);
        let projected = self.total_size - replaced.unwrap_or(0) + required;
        let count_ok = replaced.is_some() || self.entries.len() < self.config.max_entries;
        projected <= self.config.max_size && count_ok
    }

    /// Evicts entries in ascending priority order until `required` bytes fit
    /// for `key`. Ties go to the earliest insertion.
    fn ensure_capacity(&mut self, key: &str, required: usize) -> usize {
        if self.has_room(key, required) {
            return 0;
        }

        let mut ranked: Vec<(f64, u64, String)> = self
            .entries
            .iter()
            // The entry being replaced is never its own eviction victim
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, entry)| (entry.priority(), entry.seq, k.clone()))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut evicted = 0;
        for (_, _, victim) in ranked {
            if self.has_room(key, required) {
                break;
            }
            if self.remove_entry(&victim).is_some() {
                self.stats.record_eviction();
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(key, evicted, total_size = self.total_size, "Evicted entries to make room");
        }
        evicted
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether an entry was present; deleting
    /// a missing key is a no-op.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Single removal path: keeps `total_size` and the tag index consistent.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size -= entry.size;

        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }

        Some(entry)
    }

    // == Invalidation ==
    /// Deletes every entry tagged with `tag`. Returns the number removed.
    pub fn invalidate_by_tag(&mut self, tag: &str) -> usize {
        let Some(keys) = self.tag_index.remove(tag) else {
            return 0;
        };

        keys.iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count()
    }

    /// Invalidates each tag in turn. Returns the total number removed.
    pub fn invalidate_by_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> usize {
        tags.iter()
            .map(|tag| self.invalidate_by_tag(tag.as_ref()))
            .sum()
    }

    /// Deletes every key matching `pattern`. Returns the number removed.
    pub fn invalidate_by_pattern(&mut self, pattern: &Regex) -> usize {
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();

        matching
            .iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count()
    }

    // == Clear ==
    /// Removes all entries and tags. Returns the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.tag_index.clear();
        self.total_size = 0;
        count
    }

    // == Maintenance ==
    /// Removes expired entries and stale ones: idle for more than twice the
    /// default TTL with fewer than two hits.
    ///
    /// Returns the number of entries removed.
    pub fn maintenance(&mut self) -> usize {
        let stale_after = self.config.default_ttl * 2;
        let (expired, stale): (Vec<String>, Vec<String>) = {
            let mut expired = Vec::new();
            let mut stale = Vec::new();
            for (key, entry) in &self.entries {
                if entry.is_expired() {
                    expired.push(key.clone());
                } else if entry.idle_time() > stale_after && entry.hits < 2 {
                    stale.push(key.clone());
                }
            }
            (expired, stale)
        };

        for key in &expired {
            self.remove_entry(key);
            self.stats.record_expiration();
        }
        for key in &stale {
            self.remove_entry(key);
            self.stats.record_eviction();
        }

        expired.len() + stale.len()
    }

    // == Stats ==
    /// Returns counters together with a snapshot of the current contents.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let idle_ms = |entry: &CacheEntry| {
            now.saturating_duration_since(entry.last_accessed).as_millis() as u64
        };

        let mut stats = self.stats.clone();
        stats.entry_count = self.entries.len();
        stats.total_size = self.total_size;
        stats.oldest_access_ms = self.entries.values().map(idle_ms).max();
        stats.newest_access_ms = self.entries.values().map(idle_ms).min();
        stats
    }

    // == Accessors ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Sum of all stored entry sizes in bytes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn tags_of(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(|entry| entry.tags.as_slice())
    }

    /// Keys currently indexed under `tag`, sorted.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// All indexed tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tag_index.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Sum of entry sizes recomputed from scratch.
    pub fn recomputed_size(&self) -> usize {
        self.entries.values().map(|entry| entry.size).sum()
    }

    /// Checks the tag index against the entries in both directions.
    pub fn tag_index_consistent(&self) -> bool {
        let forward = self.tag_index.iter().all(|(tag, keys)| {
            !keys.is_empty()
                && keys
                    .iter()
                    .all(|key| self.entries.get(key).is_some_and(|e| e.has_tag(tag)))
        });
        let backward = self.entries.iter().all(|(key, entry)| {
            entry
                .tags
                .iter()
                .all(|tag| self.tag_index.get(tag).is_some_and(|keys| keys.contains(key)))
        });
        forward && backward
    }
}
