//! Cache module: memory-budgeted render caches.
//!
//! This module contains:
//! - [`LruCache`]: Size-aware LRU store keyed by strings
//! - [`CacheManager`]: One global budget split into [`Partition`]s

mod lru;
mod manager;

pub use lru::{estimate_size, CacheStats, LruCache};
pub use manager::{CacheConfig, CacheManager, Partition, PartitionConfig};
