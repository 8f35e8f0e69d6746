//! Size-aware LRU cache for rendered strings.
//!
//! Entries live in an [`IndexMap`] whose order is the recency order: the
//! front is the least recently used entry, the back the most recent. A hit
//! moves the entry to the back. Inserting evicts from the front until both
//! the entry cap and the byte cap leave room for the new value.

use indexmap::IndexMap;

/// Estimate the size of a cached string: two units per UTF-16 code unit.
pub fn estimate_size(value: &str) -> usize {
    value.encode_utf16().count() * 2
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently cached.
    pub entries: usize,
    /// Estimated size of all cached values.
    pub bytes: usize,
    /// Entry cap.
    pub max_entries: usize,
    /// Byte cap.
    pub max_bytes: usize,
    /// Lookups that found a value.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries evicted by capacity pressure or trimming.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit (0.0 to 1.0).
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of the byte cap in use (0.0 to 1.0).
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.bytes as f64 / self.max_bytes as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    size: usize,
}

/// LRU cache keyed by opaque strings.
#[derive(Debug, Clone)]
pub struct LruCache {
    entries: IndexMap<String, Entry>,
    bytes: usize,
    max_entries: usize,
    max_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl LruCache {
    /// Create an empty cache with the given caps.
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            bytes: 0,
            max_entries,
            max_bytes,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&str> {
        let Some(index) = self.entries.get_index_of(key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, e)| e.value.as_str())
    }

    /// Store `value` under `key`, evicting the oldest entries as needed.
    ///
    /// Without a `size_hint` the size is estimated with [`estimate_size`].
    /// A value larger than the byte cap is still stored, alone. A cache
    /// capped at zero entries stores nothing.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        size_hint: Option<usize>,
    ) {
        let key = key.into();
        self.remove(&key);
        if self.max_entries == 0 {
            return;
        }

        let value = value.into();
        let size = size_hint.unwrap_or_else(|| estimate_size(&value));
        while !self.entries.is_empty()
            && (self.entries.len() >= self.max_entries || self.bytes + size > self.max_bytes)
        {
            self.evict_front();
        }

        self.bytes += size;
        self.entries.insert(key, Entry { value, size });
    }

    /// Check membership without touching recency or counters.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove `key`. Returns its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let entry = self.entries.shift_remove(key)?;
        self.bytes -= entry.size;
        Some(entry.value)
    }

    /// Evict up to `n` least recently used entries. Returns how many went.
    pub fn evict_oldest(&mut self, n: usize) -> usize {
        let n = n.min(self.entries.len());
        for _ in 0..n {
            self.evict_front();
        }
        n
    }

    fn evict_front(&mut self) {
        if let Some((_, entry)) = self.entries.shift_remove_index(0) {
            self.bytes -= entry.size;
            self.evictions += 1;
        }
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated size of all cached values.
    pub const fn bytes(&self) -> usize {
        self.bytes
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            bytes: self.bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}
