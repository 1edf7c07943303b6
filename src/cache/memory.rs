//! In-memory tier: a bounded LRU map with TTL expiration and a background sweeper

use crate::cache::{
    config::MemoryConfig,
    entry::{CacheEntry, Expiration},
    key::CacheKey,
};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Volatile cache tier bounded by entry count and total cost.
///
/// Every operation runs under one mutex, so operations on the tier are totally
/// ordered and never fail. Entries past either limit are evicted least recently
/// used first; expired entries are only removed by the sweeper, by
/// [`MemoryStorage::remove_expired`] or by explicit removal.
pub struct MemoryStorage<K, V> {
    store: Arc<Mutex<MemoryStore<K, V>>>,
    sweeper: Option<JoinHandle<()>>,
}

/// Internal storage guarded by the tier mutex
struct MemoryStore<K, V> {
    entries: LruCache<CacheKey<K>, Slot<V>>,
    total_cost: usize,
    total_cost_limit: usize,
    count_limit: usize,
    expiration: Expiration,
    /// Bumped by every caller write or removal; promotions compare against it
    epoch: u64,
}

struct Slot<V> {
    entry: CacheEntry<V>,
    cost: usize,
}

impl<K: Hash + Eq + Clone, V> MemoryStore<K, V> {
    fn insert(&mut self, key: K, entry: CacheEntry<V>, cost: usize) {
        if let Some(previous) = self.entries.put(CacheKey::new(key), Slot { entry, cost }) {
            self.total_cost = self.total_cost.saturating_sub(previous.cost);
        }
        self.total_cost += cost;
        self.trim();
    }

    fn get(&mut self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key).map(|slot| &slot.entry)
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let slot = self.entries.pop(key)?;
        self.total_cost = self.total_cost.saturating_sub(slot.cost);
        Some(slot.entry)
    }

    fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.total_cost = 0;
        count
    }

    fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        // Snapshot first: the LRU list cannot be pruned while it is iterated.
        let expired: Vec<CacheKey<K>> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key.get());
        }

        expired.len()
    }

    fn over_limit(&self) -> bool {
        (self.count_limit > 0 && self.entries.len() > self.count_limit)
            || (self.total_cost_limit > 0 && self.total_cost > self.total_cost_limit)
    }

    /// Evict least recently used entries until both limits hold
    fn trim(&mut self) {
        while self.over_limit() {
            match self.entries.pop_lru() {
                Some((_, slot)) => {
                    self.total_cost = self.total_cost.saturating_sub(slot.cost);
                    debug!(cost = slot.cost, "Evicted memory entry over capacity");
                }
                None => break,
            }
        }
    }
}

impl<K, V> MemoryStorage<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a memory tier and start its sweeper.
    ///
    /// The sweeper needs a tokio runtime; outside one the tier still works but
    /// expired entries are only dropped by explicit sweeps.
    pub fn new(config: MemoryConfig) -> Self {
        info!(
            count_limit = config.count_limit,
            total_cost_limit = config.total_cost_limit,
            clean_interval = ?config.clean_interval,
            "Initializing memory tier"
        );

        let store = Arc::new(Mutex::new(MemoryStore {
            entries: LruCache::unbounded(),
            total_cost: 0,
            total_cost_limit: config.total_cost_limit,
            count_limit: config.count_limit,
            expiration: config.expiration,
            epoch: 0,
        }));
        let sweeper = spawn_sweeper(Arc::clone(&store), config.clean_interval);

        Self { store, sweeper }
    }

    /// Store a value with zero cost
    pub fn save(&self, key: K, value: V, expiration: Option<Expiration>) {
        self.save_with_cost(key, value, expiration, 0);
    }

    /// Store a value, charging `cost` against the total cost limit.
    ///
    /// Writes whose expiration has already passed are dropped.
    pub fn save_with_cost(&self, key: K, value: V, expiration: Option<Expiration>, cost: usize) {
        let mut store = self.store.lock();
        let expiration = expiration.unwrap_or(store.expiration);

        if expiration.is_expired_on_arrival() {
            debug!(?expiration, "Dropping memory write that is already expired");
            return;
        }

        store.insert(key, CacheEntry::new(value, expiration), cost);
        store.epoch += 1;
        debug!(entries = store.entries.len(), cost, "Saved memory entry");
    }

    /// Store a fully formed entry as a caller write
    pub(crate) fn put_entry(&self, key: K, entry: CacheEntry<V>) {
        let mut store = self.store.lock();
        store.insert(key, entry, 0);
        store.epoch += 1;
    }

    /// Look a value up and report the write epoch observed by the lookup
    pub(crate) fn lookup(&self, key: &K) -> (Option<V>, u64) {
        let mut store = self.store.lock();
        let value = Self::live_value(&mut store, key);
        (value, store.epoch)
    }

    /// Copy an entry read from disk into memory, keeping its timestamps.
    ///
    /// Skipped when the tier saw a write or removal since `epoch` was
    /// observed, since the entry may then be older than what memory holds.
    pub(crate) fn promote(&self, key: K, entry: CacheEntry<V>, epoch: u64) -> bool {
        let mut store = self.store.lock();
        if store.epoch != epoch || entry.is_expired() {
            return false;
        }
        store.insert(key, entry, 0);
        true
    }

    /// Get a live value.
    ///
    /// Expired entries read as absent but stay stored until swept or removed.
    pub fn retrieve(&self, key: &K) -> Option<V> {
        Self::live_value(&mut self.store.lock(), key)
    }

    fn live_value(store: &mut MemoryStore<K, V>, key: &K) -> Option<V> {
        match store.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                debug!("Memory entry expired");
                None
            }
            None => None,
        }
    }

    /// Whether [`MemoryStorage::retrieve`] would return a value
    pub fn is_cached(&self, key: &K) -> bool {
        let mut store = self.store.lock();
        store.get(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Remove a single entry
    pub fn remove(&self, key: &K) {
        let mut store = self.store.lock();
        store.epoch += 1;
        if store.remove(key).is_some() {
            debug!("Removed memory entry");
        }
    }

    /// Remove every entry
    pub fn remove_all(&self) {
        let mut store = self.store.lock();
        store.epoch += 1;
        let count = store.clear();
        debug!(count, "Cleared memory tier");
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn remove_expired(&self) -> usize {
        self.store.lock().remove_expired(Utc::now())
    }

    /// Change the cost limit (0 = unlimited), evicting immediately if needed
    pub fn set_total_cost_limit(&self, limit: usize) {
        let mut store = self.store.lock();
        store.total_cost_limit = limit;
        store.trim();
    }

    /// Change the entry-count limit (0 = unlimited), evicting immediately if needed
    pub fn set_count_limit(&self, limit: usize) {
        let mut store = self.store.lock();
        store.count_limit = limit;
        store.trim();
    }

    /// Current cost limit
    pub fn total_cost_limit(&self) -> usize {
        self.store.lock().total_cost_limit
    }

    /// Current entry-count limit
    pub fn count_limit(&self) -> usize {
        self.store.lock().count_limit
    }

    /// Expiration used when a write does not specify one
    pub fn default_expiration(&self) -> Expiration {
        self.store.lock().expiration
    }

    /// Summed cost of stored entries
    pub fn total_cost(&self) -> usize {
        self.store.lock().total_cost
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Check if the tier holds no entries
    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }
}

impl<K, V> Drop for MemoryStorage<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

fn spawn_sweeper<K, V>(
    store: Arc<Mutex<MemoryStore<K, V>>>,
    interval: Duration,
) -> Option<JoinHandle<()>>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    if interval.is_zero() {
        return None;
    }

    let Ok(runtime) = Handle::try_current() else {
        warn!("No tokio runtime available, memory sweeper disabled");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.lock().remove_expired(Utc::now());
            if removed > 0 {
                info!(removed, "Memory sweep removed expired entries");
            }
        }
    }))
}
