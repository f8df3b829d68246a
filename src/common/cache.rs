//! In-memory cache for live objects.
//!
//! Uses moka's concurrent cache implementation.

use std::time::Duration;

use moka::sync::Cache;

/// Thread-safe in-memory cache with bounded capacity and idle expiry.
///
/// Used for the engine's live sessions (`MemCache<SessionId, Arc<Mutex<Session>>>`).
/// Entries untouched for longer than the idle timeout are dropped silently, and the
/// least recently used entries are evicted once capacity is exceeded.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(
        capacity: u64,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).time_to_idle(idle_timeout).build(),
        }
    }

    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get an entry, refreshing its idle timer.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    pub fn remove(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn contains(
        &self,
        key: &K,
    ) -> bool {
        self.entries.contains_key(key)
    }
}
