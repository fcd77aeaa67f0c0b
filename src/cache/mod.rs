//! Cache Module
//!
//! Provides in-memory caching with TTL expiry, tag-based invalidation and
//! size-aware eviction, plus a manager adding get-or-populate semantics.

mod entry;
mod manager;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use manager::CacheManager;
pub use stats::CacheStats;
pub use store::{CacheOptions, CacheStore};
