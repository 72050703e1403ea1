use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::metrics;

/// Upper bound on how stale a cached registry read may be.
pub const MAX_TTL: Duration = Duration::from_secs(60);

/// Concurrent map with a per-entry TTL and a size bound.
///
/// When full, expired entries are dropped first and then the oldest one.
/// Every [`invalidate_all`](Self::invalidate_all) bumps a generation so a read
/// that started before it cannot repopulate the cache.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: DashMap<K, (Instant, V)>,
    generation: AtomicU64,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            ttl: ttl.min(MAX_TTL),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key).and_then(|entry| {
            let (inserted, value) = entry.value();
            (inserted.elapsed() < self.ttl).then(|| value.clone())
        });
        metrics::record_cache(self.name, hit.is_some());
        hit
    }

    pub fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict();
        }
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Capture before reading the backing store; pass to [`insert_read_at`](Self::insert_read_at).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Insert a value read while the cache was at `generation`. The value is
    /// dropped if an invalidation happened since, including one that races
    /// with this insert.
    pub fn insert_read_at(&self, generation: u64, key: K, value: V) {
        if self.generation() != generation {
            debug!(cache = self.name, "Discarding read that predates an invalidation");
            return;
        }
        self.insert(key.clone(), value);
        if self.generation() != generation {
            self.entries.remove(&key);
        }
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(cache = self.name, entries = self.entries.len(), "Invalidating cache");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        if self.entries.len() < self.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().0)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
