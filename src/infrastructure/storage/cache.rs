// Bounded in-memory query-result cache with weighted eviction.
use crate::domain::error::SqlCacheError;
use crate::domain::model::{KeyComparer, Query, QueryValue};
use crate::infrastructure::storage::eviction::{EvictionPolicy, WeightedEviction};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Instant;
use tracing::debug;

/// Weight assigned to entries that have never been read, so a freshly
/// stored result is not evicted before anyone had a chance to use it.
pub(crate) const FRESH_ENTRY_WEIGHT: f64 = 1000.0;

/// Upper bound on the number of cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Unbounded,
    Bounded(NonZeroUsize),
}

impl Capacity {
    /// Builds a bounded capacity, rejecting zero.
    pub fn bounded(max_entries: usize) -> Result<Self, SqlCacheError> {
        NonZeroUsize::new(max_entries)
            .map(Self::Bounded)
            .ok_or(SqlCacheError::InvalidCacheCapacity(max_entries as i64))
    }

    /// Converts a raw configuration value; non-positive values are a
    /// configuration error, not a silent "cache nothing".
    pub fn from_config(raw: i64) -> Result<Self, SqlCacheError> {
        if raw <= 0 {
            return Err(SqlCacheError::InvalidCacheCapacity(raw));
        }
        Self::bounded(raw as usize)
    }

    /// Whether a map currently holding `len` entries may take one more.
    fn admits(&self, len: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(max) => len < max.get(),
        }
    }
}

/// A single cached result with its access bookkeeping.
pub struct CacheEntry {
    /// The key as the caller first supplied it (pre-normalization).
    pub(crate) original_key: String,
    /// The statement that produced the value; re-run by the refresh cycle.
    pub(crate) query: Query,
    pub(crate) value: QueryValue,
    pub(crate) created: Instant,
    pub(crate) last_accessed: Instant,
    pub(crate) access_count: u64,
}

impl CacheEntry {
    fn new(original_key: String, query: Query, value: QueryValue) -> Self {
        let now = Instant::now();
        Self {
            original_key,
            query,
            value,
            created: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Records a read hit.
    pub(crate) fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }

    /// Replaces the value in place. A refresh is not a use, so the access
    /// count stays put.
    pub(crate) fn update(&mut self, value: QueryValue) {
        self.value = value;
        self.last_accessed = Instant::now();
    }

    /// Eviction score: higher means less valuable. Entries that are old,
    /// rarely read and idle score high; long-lived entries that are read
    /// often and recently score low.
    pub(crate) fn weight(&self, now: Instant) -> f64 {
        if self.access_count == 0 {
            return FRESH_ENTRY_WEIGHT;
        }

        let age_ms = now.saturating_duration_since(self.created).as_millis() as f64;
        let idle_ms = now.saturating_duration_since(self.last_accessed).as_millis() as f64;
        age_ms * idle_ms / (self.access_count as f64 * 1000.0)
    }
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    capacity: Capacity,
    comparer: KeyComparer,
}

/// Thread-safe bounded cache mapping query keys to their latest results.
///
/// Keys are normalized by the configured [`KeyComparer`], so `"SELECT A"`
/// and `"select a"` share one slot under the default comparer. A single
/// lock guards the map; eviction needs a consistent scan of every entry,
/// which rules out sharded maps.
pub struct QueryCache {
    inner: RwLock<CacheInner>,
    policy: Box<dyn EvictionPolicy>,
}

impl QueryCache {
    pub fn new(capacity: Capacity, comparer: KeyComparer) -> Self {
        Self::with_policy(capacity, comparer, Box::new(WeightedEviction))
    }

    pub fn with_policy(
        capacity: Capacity,
        comparer: KeyComparer,
        policy: Box<dyn EvictionPolicy>,
    ) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                capacity,
                comparer,
            }),
            policy,
        }
    }

    /// Looks a result up, recording the hit on success.
    pub fn get(&self, key: &str) -> Option<QueryValue> {
        let mut inner = self.inner.write();
        let normalized = inner.comparer.normalize(key);

        match inner.entries.get_mut(&normalized) {
            Some(entry) => {
                entry.touch();
                debug!("cache hit: {}", key);
                Some(entry.value.clone())
            }
            None => {
                debug!("cache miss: {}", key);
                None
            }
        }
    }

    /// Stores a result. An existing entry is updated in place (refresh
    /// semantics); a new entry may first evict the policy's victim when the
    /// cache is full.
    pub fn put(&self, query: &Query, value: QueryValue) -> Result<(), SqlCacheError> {
        let mut inner = self.inner.write();
        let normalized = inner.comparer.normalize(query.cache_key());

        if let Some(entry) = inner.entries.get_mut(&normalized) {
            entry.update(value);
            return Ok(());
        }

        if !inner.capacity.admits(inner.entries.len()) {
            let victim = self
                .policy
                .select_victim(Instant::now(), &inner.entries)
                .ok_or(SqlCacheError::InvalidCacheCapacity(0))?;
            inner.entries.remove(&victim);
            debug!("cache evict: {}", victim);
        }

        let entry = CacheEntry::new(query.cache_key().to_string(), query.clone(), value);
        inner.entries.insert(normalized, entry);
        Ok(())
    }

    /// Update-only store used by the refresh cycle: never inserts, never
    /// evicts, never counts as a use. Returns false when the key was
    /// invalidated since the cycle snapshotted it.
    pub fn refresh(&self, key: &str, value: QueryValue) -> bool {
        let mut inner = self.inner.write();
        let normalized = inner.comparer.normalize(key);

        match inner.entries.get_mut(&normalized) {
            Some(entry) => {
                entry.update(value);
                true
            }
            None => false,
        }
    }

    /// Removes an entry; returns whether anything was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        let normalized = inner.comparer.normalize(key);
        inner.entries.remove(&normalized).is_some()
    }

    /// Point-in-time snapshot of the cached keys (as originally supplied).
    /// The lock is released before returning, so callers may re-enter the
    /// cache while iterating.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .entries
            .values()
            .map(|e| e.original_key.clone())
            .collect()
    }

    /// The stored statement for a key, so a refresh can re-execute it.
    pub fn query_for(&self, key: &str) -> Option<Query> {
        let inner = self.inner.read();
        let normalized = inner.comparer.normalize(key);
        inner.entries.get(&normalized).map(|e| e.query.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn into_entries(self) -> HashMap<String, CacheEntry> {
        self.inner.into_inner().entries
    }

    /// Applies a new capacity and comparer to the live cache. Entries are
    /// re-keyed under the new comparer (when two keys collapse into one, the
    /// most recently accessed entry survives) and evicted down to the new
    /// capacity through the policy.
    pub fn reconfigure(&self, capacity: Capacity, comparer: KeyComparer) {
        let mut inner = self.inner.write();
        inner.capacity = capacity;
        inner.comparer = comparer;

        let old = std::mem::take(&mut inner.entries);
        for (_, entry) in old {
            let normalized = comparer.normalize(&entry.original_key);
            match inner.entries.entry(normalized) {
                Entry::Occupied(mut slot) => {
                    if entry.last_accessed > slot.get().last_accessed {
                        slot.insert(entry);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
            }
        }

        if let Capacity::Bounded(max) = inner.capacity {
            while inner.entries.len() > max.get() {
                match self.policy.select_victim(Instant::now(), &inner.entries) {
                    Some(victim) => {
                        inner.entries.remove(&victim);
                        debug!("cache evict on reconfigure: {}", victim);
                    }
                    None => break,
                }
            }
        }
    }
}
