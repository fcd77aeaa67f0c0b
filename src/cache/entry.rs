//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, tags and
//! access statistics.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with its serialized value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value, serialized as JSON
    pub value: String,
    /// Instant after which the entry is logically absent
    pub expires_at: Instant,
    /// Labels used for bulk invalidation, without duplicates
    pub tags: Vec<String>,
    /// Byte cost of the serialized value
    pub size: usize,
    /// Updated on every successful read
    pub last_accessed: Instant,
    /// Successful reads since the entry was (re)placed
    pub hits: u64,
    /// Insertion sequence number, used to break eviction ties
    pub seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl` from now.
    ///
    /// # Arguments
    /// * `value` - The serialized value; its length becomes the entry size
    /// * `ttl` - Time to live
    /// * `tags` - Invalidation tags; duplicates are dropped
    /// * `seq` - Insertion sequence number assigned by the store
    pub fn new(value: String, ttl: Duration, tags: Vec<String>, seq: u64) -> Self {
        let now = Instant::now();
        let mut unique_tags: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique_tags.contains(&tag) {
                unique_tags.push(tag);
            }
        }

        Self {
            size: value.len(),
            value,
            expires_at: now + ttl,
            tags: unique_tags,
            last_accessed: now,
            hits: 0,
            seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current instant is strictly past
    /// `expires_at`.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    // == Record Hit ==
    /// Counts a successful read and refreshes the access time.
    pub fn touch(&mut self) {
        self.hits += 1;
        self.last_accessed = Instant::now();
    }

    // == Idle Time ==
    /// Time elapsed since the last successful read (or insertion).
    pub fn idle_time(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_accessed)
    }

    // == Priority ==
    /// Eviction priority: `hits / max(idle_ms, 1) * size`. Lower is evicted
    /// first, so large, stale, rarely read entries go before small hot ones.
    pub fn priority(&self) -> f64 {
        let idle_ms = self.idle_time().as_millis().max(1) as f64;
        self.hits as f64 / idle_ms * self.size as f64
    }

    // == Time To Live ==
    /// Returns the remaining TTL, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Deserializes the stored value.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.value)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry::new("\"value\"".to_string(), ttl, vec![], 0)
    }

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(
            "{\"v\":1}".to_string(),
            Duration::from_secs(60),
            vec!["a".into(), "b".into(), "a".into()],
            7,
        );

        assert_eq!(entry.size, 7);
        assert_eq!(entry.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(entry.hits, 0);
        assert_eq!(entry.seq, 7);
        assert!(!entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let entry = entry(Duration::from_secs(1));
        assert!(!entry.is_expired());

        // Exactly at the boundary the entry is still live
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_updates_stats() {
        let mut entry = entry(Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(entry.idle_time(), Duration::from_millis(500));

        entry.touch();
        assert_eq!(entry.hits, 1);
        assert_eq!(entry.idle_time(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_favors_hot_entries() {
        let cold = entry(Duration::from_secs(60));
        let mut hot = entry(Duration::from_secs(60));
        hot.touch();
        hot.touch();

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(cold.priority(), 0.0);
        assert!(hot.priority() > cold.priority());
    }

    #[test]
    fn test_decode() {
        let entry = CacheEntry::new("[1,2,3]".to_string(), Duration::from_secs(1), vec![], 0);
        let decoded: Vec<u32> = entry.decode().unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
        assert!(entry.decode::<String>().is_err());
    }
}
