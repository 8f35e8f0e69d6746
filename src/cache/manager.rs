//! Partitioned cache manager.
//!
//! One global size budget is split into fixed shares, one per [`Partition`].
//! Each partition is an independent [`LruCache`] with its own entry cap and a
//! byte cap derived from its share. When the summed size of all partitions
//! crosses the trim threshold, [`CacheManager::trim_if_needed`] evicts a
//! fixed fraction of the oldest entries from every partition.

use super::lru::{CacheStats, LruCache};
use crate::error::{Error, Result};
use tracing::debug;

/// Purpose-specific cache partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Full render output of the synchronous strategy.
    SyncRender,
    /// Full render output of the asynchronous strategy.
    AsyncRender,
    /// Display-mode math sub-renders.
    DisplayMath,
    /// Inline math sub-renders.
    InlineMath,
    /// Code block highlighting sub-renders.
    Highlight,
}

impl Partition {
    /// Every partition, in index order.
    pub const ALL: [Self; 5] = [
        Self::SyncRender,
        Self::AsyncRender,
        Self::DisplayMath,
        Self::InlineMath,
        Self::Highlight,
    ];

    /// Short name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SyncRender => "sync-render",
            Self::AsyncRender => "async-render",
            Self::DisplayMath => "display-math",
            Self::InlineMath => "inline-math",
            Self::Highlight => "highlight",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Budget share and entry cap of one partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionConfig {
    /// Fraction of the global budget (0.0 to 1.0).
    pub share: f64,
    /// Maximum number of entries.
    pub max_entries: usize,
}

impl PartitionConfig {
    /// Create a partition config.
    pub const fn new(share: f64, max_entries: usize) -> Self {
        Self { share, max_entries }
    }
}

/// Configuration for the cache manager.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Global size budget shared by all partitions.
    pub budget: usize,
    /// Fraction of the budget above which a trim evicts entries.
    pub trim_threshold: f64,
    /// Fraction of each partition's entries evicted by a trim (rounded up).
    pub trim_fraction: f64,
    /// Per-partition settings, indexed like [`Partition::ALL`].
    pub partitions: [PartitionConfig; 5],
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget: 10 * 1024 * 1024,
            trim_threshold: 0.9,
            trim_fraction: 0.25,
            partitions: [
                PartitionConfig::new(0.25, 64),
                PartitionConfig::new(0.25, 64),
                PartitionConfig::new(0.20, 256),
                PartitionConfig::new(0.20, 1024),
                PartitionConfig::new(0.10, 256),
            ],
        }
    }
}

impl CacheConfig {
    /// Set the global budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Set the trim threshold.
    #[must_use]
    pub const fn with_trim_threshold(mut self, threshold: f64) -> Self {
        self.trim_threshold = threshold;
        self
    }

    /// Set the fraction evicted per trim.
    #[must_use]
    pub const fn with_trim_fraction(mut self, fraction: f64) -> Self {
        self.trim_fraction = fraction;
        self
    }

    /// Override one partition's share and entry cap.
    #[must_use]
    pub fn with_partition(mut self, partition: Partition, share: f64, max_entries: usize) -> Self {
        self.partitions[partition.index()] = PartitionConfig::new(share, max_entries);
        self
    }

    /// Settings of `partition`.
    pub const fn partition(&self, partition: Partition) -> PartitionConfig {
        self.partitions[partition.index()]
    }

    /// Byte cap of `partition`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn partition_bytes(&self, partition: Partition) -> usize {
        (self.budget as f64 * self.partition(partition).share) as usize
    }

    /// Total size above which a trim evicts entries.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn trim_bytes(&self) -> usize {
        (self.budget as f64 * self.trim_threshold) as usize
    }

    /// Check that shares and fractions are in range.
    pub fn validate(&self) -> Result<()> {
        let mut total = 0.0;
        for partition in Partition::ALL {
            let share = self.partition(partition).share;
            if !(0.0..=1.0).contains(&share) {
                return Err(Error::config(format!(
                    "share of {} must be within [0, 1], got {share}",
                    partition.name()
                )));
            }
            if self.partition(partition).max_entries == 0 {
                return Err(Error::config(format!(
                    "{} must allow at least one entry",
                    partition.name()
                )));
            }
            total += share;
        }
        if total > 1.0 + 1e-9 {
            return Err(Error::config(format!(
                "partition shares sum to {total}, over the whole budget"
            )));
        }
        if !(self.trim_threshold > 0.0 && self.trim_threshold <= 1.0) {
            return Err(Error::config(format!(
                "trim threshold must be within (0, 1], got {}",
                self.trim_threshold
            )));
        }
        if !(self.trim_fraction > 0.0 && self.trim_fraction <= 1.0) {
            return Err(Error::config(format!(
                "trim fraction must be within (0, 1], got {}",
                self.trim_fraction
            )));
        }
        Ok(())
    }
}

/// Owner of every cache partition.
#[derive(Debug, Clone)]
pub struct CacheManager {
    config: CacheConfig,
    partitions: [LruCache; 5],
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::build(CacheConfig::default())
    }
}

impl CacheManager {
    /// Create a manager from a validated configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        let partitions = Partition::ALL.map(|p| {
            LruCache::new(config.partition(p).max_entries, config.partition_bytes(p))
        });
        Self { config, partitions }
    }

    /// The configuration in use.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Borrow one partition.
    pub const fn partition(&self, partition: Partition) -> &LruCache {
        &self.partitions[partition.index()]
    }

    /// Mutably borrow one partition.
    pub fn partition_mut(&mut self, partition: Partition) -> &mut LruCache {
        &mut self.partitions[partition.index()]
    }

    /// Look up `key` in `partition`, promoting it on a hit.
    pub fn get(&mut self, partition: Partition, key: &str) -> Option<&str> {
        self.partition_mut(partition).get(key)
    }

    /// Store `value` under `key` in `partition`.
    pub fn set(
        &mut self,
        partition: Partition,
        key: impl Into<String>,
        value: impl Into<String>,
        size_hint: Option<usize>,
    ) {
        self.partition_mut(partition).set(key, value, size_hint);
    }

    /// Check membership without promotion.
    pub fn has(&self, partition: Partition, key: &str) -> bool {
        self.partition(partition).has(key)
    }

    /// Remove `key` from `partition`.
    pub fn remove(&mut self, partition: Partition, key: &str) -> Option<String> {
        self.partition_mut(partition).remove(key)
    }

    /// Empty one partition.
    pub fn clear(&mut self, partition: Partition) {
        self.partition_mut(partition).clear();
    }

    /// Evict the `n` oldest entries of `partition`.
    pub fn evict_oldest(&mut self, partition: Partition, n: usize) -> usize {
        self.partition_mut(partition).evict_oldest(n)
    }

    /// Statistics of one partition.
    pub fn stats(&self, partition: Partition) -> CacheStats {
        self.partition(partition).stats()
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with<F>(&mut self, partition: Partition, key: &str, compute: F) -> String
    where
        F: FnOnce() -> String,
    {
        if let Some(hit) = self.get(partition, key) {
            return hit.to_owned();
        }
        let value = compute();
        self.set(partition, key, value.clone(), None);
        value
    }

    /// Summed estimated size of every partition.
    pub fn total_bytes(&self) -> usize {
        self.partitions.iter().map(LruCache::bytes).sum()
    }

    /// Summed entry count of every partition.
    pub fn total_entries(&self) -> usize {
        self.partitions.iter().map(LruCache::len).sum()
    }

    /// Evict the oldest share of every partition when total usage is over
    /// the trim threshold. Returns the number of entries evicted.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn trim_if_needed(&mut self) -> usize {
        let total = self.total_bytes();
        if total <= self.config.trim_bytes() {
            return 0;
        }

        let fraction = self.config.trim_fraction;
        let mut evicted = 0;
        for cache in &mut self.partitions {
            let n = (cache.len() as f64 * fraction).ceil() as usize;
            evicted += cache.evict_oldest(n);
        }
        debug!(
            total_bytes = total,
            remaining_bytes = self.total_bytes(),
            evicted,
            "cache trimmed"
        );
        evicted
    }

    /// Empty every partition.
    pub fn clear_all(&mut self) {
        for cache in &mut self.partitions {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let caches = CacheManager::default();
        let budget = 10 * 1024 * 1024;

        let sync = caches.stats(Partition::SyncRender);
        assert_eq!((sync.max_entries, sync.max_bytes), (64, budget / 4));
        assert_eq!(caches.stats(Partition::InlineMath).max_entries, 1024);
        assert_eq!(caches.stats(Partition::Highlight).max_bytes, budget / 10);
    }

    #[test]
    fn test_partitions_are_independent() {
        let mut caches = CacheManager::default();
        caches.set(Partition::InlineMath, "x", "<i>x</i>", None);

        assert!(caches.has(Partition::InlineMath, "x"));
        assert!(!caches.has(Partition::DisplayMath, "x"));
        assert_eq!(caches.get(Partition::InlineMath, "x"), Some("<i>x</i>"));
        assert_eq!(caches.remove(Partition::InlineMath, "x").as_deref(), Some("<i>x</i>"));
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let mut caches = CacheManager::default();
        let mut calls = 0;

        for _ in 0..3 {
            let value = caches.get_or_insert_with(Partition::Highlight, "fn", || {
                calls += 1;
                "<b>fn</b>".to_owned()
            });
            assert_eq!(value, "<b>fn</b>");
        }

        assert_eq!(calls, 1);
        let stats = caches.stats(Partition::Highlight);
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn test_trim_only_over_threshold() {
        let config = CacheConfig::default().with_budget(1000);
        let mut caches = CacheManager::new(config).unwrap();
        // Size hints stay within each partition's byte cap.
        for i in 0..4 {
            caches.set(Partition::InlineMath, format!("i{i}"), "v", Some(50));
        }
        assert_eq!(caches.total_bytes(), 200);
        assert_eq!(caches.trim_if_needed(), 0);

        for i in 0..4 {
            caches.set(Partition::SyncRender, format!("s{i}"), "v", Some(60));
            caches.set(Partition::DisplayMath, format!("d{i}"), "v", Some(50));
            caches.set(Partition::AsyncRender, format!("a{i}"), "v", Some(60));
        }
        assert_eq!(caches.total_bytes(), 200 + 240 + 200 + 240);
        assert!(caches.total_bytes() <= 900);
        assert_eq!(caches.trim_if_needed(), 0);

        caches.set(Partition::Highlight, "h", "v", Some(90));
        assert!(caches.total_bytes() > 900);

        // ceil(25%) of 4, 4, 4, 4 and 1 entries.
        assert_eq!(caches.trim_if_needed(), 5);
        assert!(!caches.has(Partition::SyncRender, "s0"));
        assert!(caches.has(Partition::SyncRender, "s1"));
        assert!(!caches.has(Partition::Highlight, "h"));
    }

    #[test]
    fn test_clear_all() {
        let mut caches = CacheManager::default();
        for partition in Partition::ALL {
            caches.set(partition, "k", "v", None);
        }
        assert_eq!(caches.total_entries(), 5);
        caches.clear_all();
        assert_eq!(caches.total_entries(), 0);
        assert_eq!(caches.total_bytes(), 0);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let over = CacheConfig::default().with_partition(Partition::Highlight, 0.5, 10);
        assert!(matches!(CacheManager::new(over), Err(Error::Config(_))));

        let negative = CacheConfig::default().with_partition(Partition::Highlight, -0.1, 10);
        assert!(negative.validate().is_err());

        let fraction = CacheConfig::default().with_trim_fraction(0.0);
        assert!(fraction.validate().is_err());

        let no_entries = CacheConfig::default().with_partition(Partition::InlineMath, 0.2, 0);
        assert!(matches!(CacheManager::new(no_entries), Err(Error::Config(_))));

        assert!(CacheConfig::default().validate().is_ok());
    }
}
