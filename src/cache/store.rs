//! Two-tier cache composing the memory and disk tiers

use crate::cache::{
    config::CacheConfig,
    disk::{DiskStorage, Pending},
    entry::{CacheEntry, Expiration},
    event::{ChangeEvent, ChangeKind},
    memory::MemoryStorage,
    types::{CacheStats, StatsCounters},
};
use crate::error::Result;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Memory tier in front of a disk tier, with a change-event stream.
///
/// This implementation provides:
/// - Synchronous memory writes followed by queued disk writes
/// - Read-through promotion of disk hits into memory
/// - A broadcast stream of [`ChangeEvent`]s, one per write or removal,
///   published when the disk leg finishes
///
/// The tiers are not updated atomically: memory may already reflect a write
/// whose disk leg is still pending or has failed. Failures of the disk leg
/// are reported through the returned [`Pending`] and the change stream.
pub struct HybridCache<K, V> {
    memory: MemoryStorage<K, V>,
    disk: DiskStorage<K, V>,
    events: broadcast::Sender<ChangeEvent<K, V>>,
    stats: Arc<StatsCounters>,
}

impl<K, V> HybridCache<K, V>
where
    K: Hash + Eq + Clone + Display + Send + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a cache from configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let memory = MemoryStorage::new(config.memory);
        let disk = DiskStorage::new(config.disk)?;

        Ok(Self::from_tiers(memory, disk, config.event_capacity))
    }

    /// Compose already constructed tiers
    pub fn from_tiers(
        memory: MemoryStorage<K, V>,
        disk: DiskStorage<K, V>,
        event_capacity: usize,
    ) -> Self {
        info!(
            directory = %disk.directory().display(),
            event_capacity,
            "Initializing hybrid cache"
        );

        let (events, _) = broadcast::channel(event_capacity.max(1));

        Self {
            memory,
            disk,
            events,
            stats: Arc::new(StatsCounters::default()),
        }
    }

    /// Subscribe to change events.
    ///
    /// Each subscriber sees every event emitted after it subscribed, in
    /// emission order. A subscriber that falls more than `event_capacity`
    /// events behind receives `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<K, V>> {
        self.events.subscribe()
    }

    /// Store a value in memory now and on disk in the background.
    ///
    /// The returned handle resolves once the disk write finished; dropping it
    /// does not cancel the write. A `Save` event is published either way.
    /// Both tiers judge the write against the same instant: a write that is
    /// already expired for either tier is dropped from both, without an event.
    pub fn save(&self, key: K, value: V, expiration: Option<Expiration>) -> Pending<()> {
        let now = Utc::now();
        let memory_expiration = expiration.unwrap_or_else(|| self.memory.default_expiration());
        let disk_expiration = expiration.unwrap_or_else(|| self.disk.default_expiration());

        if memory_expiration.is_expired_on_arrival_at(now)
            || disk_expiration.is_expired_on_arrival_at(now)
        {
            debug!(key = %key, "Dropping write that is already expired");
            return Pending::ready(Ok(()));
        }

        self.memory.put_entry(
            key.clone(),
            CacheEntry::with_added_at(value.clone(), memory_expiration, now),
        );

        let (tx, pending) = Pending::channel();
        let events = self.events.clone();
        let stats = Arc::clone(&self.stats);
        let subject = key.clone();

        let entry = CacheEntry::with_added_at(value.clone(), disk_expiration, now);

        self.disk.save_entry_then(&subject, entry, move |result| {
            let event = match &result {
                Ok(()) => ChangeEvent::new(ChangeKind::Save(key), Some(value)),
                Err(e) => {
                    StatsCounters::bump(&stats.disk_failures);
                    ChangeEvent::failed(ChangeKind::Save(key), e.clone())
                }
            };
            // No subscribers is not an error
            let _ = events.send(event);
            let _ = tx.send(result);
        });

        pending
    }

    /// Look a value up, memory first.
    ///
    /// A disk hit is promoted into memory with its original expiration,
    /// unless memory was written or cleared while the disk read was queued.
    /// Errors other than "not found" from the disk tier are returned.
    pub async fn retrieve(&self, key: &K) -> Result<Option<V>> {
        let (cached, epoch) = self.memory.lookup(key);
        if let Some(value) = cached {
            StatsCounters::bump(&self.stats.memory_hits);
            debug!(key = %key, "Memory hit");
            return Ok(Some(value));
        }

        match self.disk.retrieve_entry(key).await {
            Ok(Some(entry)) => {
                StatsCounters::bump(&self.stats.disk_hits);
                let value = entry.value.clone();
                if self.memory.promote(key.clone(), entry, epoch) {
                    StatsCounters::bump(&self.stats.promotions);
                    debug!(key = %key, "Disk hit promoted into memory");
                } else {
                    debug!(key = %key, "Memory changed during disk read, promotion skipped");
                }
                Ok(Some(value))
            }
            Ok(None) => {
                StatsCounters::bump(&self.stats.misses);
                debug!(key = %key, "Cache miss (expired on disk)");
                Ok(None)
            }
            Err(e) if e.is_not_found() => {
                StatsCounters::bump(&self.stats.misses);
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.disk_failures);
                warn!(key = %key, error = %e, "Disk read failed");
                Err(e)
            }
        }
    }

    /// Whether either tier holds a live value; may promote a disk hit
    pub async fn is_cached(&self, key: &K) -> bool {
        matches!(self.retrieve(key).await, Ok(Some(_)))
    }

    /// Remove a key from both tiers.
    ///
    /// The published `Remove` event carries the value held before removal,
    /// taken from memory or, failing that, from the disk file.
    pub fn remove(&self, key: &K) -> Pending<()> {
        let previous = self.memory.retrieve(key);
        self.memory.remove(key);

        let (tx, pending) = Pending::channel();
        let events = self.events.clone();
        let stats = Arc::clone(&self.stats);
        let subject = key.clone();

        self.disk.remove_then(key, move |result| {
            let (event, outcome) = match result {
                Ok(on_disk) => (
                    ChangeEvent::new(ChangeKind::Remove(subject), previous.or(on_disk)),
                    Ok(()),
                ),
                Err(e) => {
                    StatsCounters::bump(&stats.disk_failures);
                    (ChangeEvent::failed(ChangeKind::Remove(subject), e.clone()), Err(e))
                }
            };
            let _ = events.send(event);
            let _ = tx.send(outcome);
        });

        pending
    }

    /// Remove every entry from both tiers
    pub fn remove_all(&self) -> Pending<()> {
        self.memory.remove_all();

        let (tx, pending) = Pending::channel();
        let events = self.events.clone();
        let stats = Arc::clone(&self.stats);

        self.disk.remove_all_then(move |result| {
            let event = match &result {
                Ok(()) => ChangeEvent::new(ChangeKind::RemoveAll, None),
                Err(e) => {
                    StatsCounters::bump(&stats.disk_failures);
                    ChangeEvent::failed(ChangeKind::RemoveAll, e.clone())
                }
            };
            let _ = events.send(event);
            let _ = tx.send(result);
        });

        pending
    }

    /// Sweep both tiers now, returning the number of entries removed
    pub async fn remove_expired(&self) -> Result<usize> {
        let from_memory = self.memory.remove_expired();
        let from_disk = self.disk.remove_expired().await?;
        Ok(from_memory + from_disk)
    }

    /// Snapshot of read statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// The memory tier
    pub fn memory(&self) -> &MemoryStorage<K, V> {
        &self.memory
    }

    /// The disk tier
    pub fn disk(&self) -> &DiskStorage<K, V> {
        &self.disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> HybridCache<String, String> {
        let config = CacheConfig::builder()
            .directory(dir.path())
            .clean_interval(Duration::ZERO)
            .build();
        HybridCache::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_basic_save_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache
            .save("key1".to_string(), "value1".to_string(), None)
            .await
            .unwrap();

        let value = cache.retrieve(&"key1".to_string()).await.unwrap();
        assert_eq!(value, Some("value1".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_memory_is_written_before_disk_completes() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        let pending = cache.save("k".to_string(), "v".to_string(), None);
        assert_eq!(cache.memory().retrieve(&"k".to_string()), Some("v".to_string()));

        pending.await.unwrap();
        assert!(dir.path().join("k").exists());
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        let value = cache.retrieve(&"nonexistent".to_string()).await.unwrap();
        assert_eq!(value, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_promotion_from_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let key = "promoted".to_string();

        cache.save(key.clone(), "v".to_string(), None).await.unwrap();
        cache.memory().remove_all();
        assert!(!cache.memory().is_cached(&key));

        assert_eq!(cache.retrieve(&key).await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.memory().retrieve(&key), Some("v".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.promotions, 1);
    }

    #[tokio::test]
    async fn test_decode_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        std::fs::write(dir.path().join("corrupt"), b"][").unwrap();

        let result = cache.retrieve(&"corrupt".to_string()).await;
        assert!(matches!(result, Err(CacheError::DecodingFailed(_))));
        assert!(!cache.is_cached(&"corrupt".to_string()).await);
        assert_eq!(cache.stats().disk_failures, 2);
    }

    #[tokio::test]
    async fn test_remove_event_carries_previous_value() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let mut events = cache.subscribe();

        cache.save("k".to_string(), "v".to_string(), None).await.unwrap();
        cache.remove(&"k".to_string()).await.unwrap();

        let saved = events.recv().await.unwrap();
        assert_eq!(saved.kind, ChangeKind::Save("k".to_string()));

        let removed = events.recv().await.unwrap();
        assert_eq!(removed.kind, ChangeKind::Remove("k".to_string()));
        assert_eq!(removed.value, Some("v".to_string()));
        assert!(removed.is_success());

        assert_eq!(cache.retrieve(&"k".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_save_emits_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let mut events = cache.subscribe();

        cache
            .save("k".to_string(), "v".to_string(), Some(Expiration::Seconds(0.0)))
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(cache.memory().is_empty());
        assert_eq!(cache.disk().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_is_published() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let config = CacheConfig::builder()
            .directory(&cache_dir)
            .clean_interval(Duration::ZERO)
            .build();
        let cache: HybridCache<String, String> = HybridCache::new(config).unwrap();
        let mut events = cache.subscribe();

        std::fs::remove_dir_all(&cache_dir).unwrap();
        std::fs::write(&cache_dir, b"").unwrap();

        let result = cache.save("k".to_string(), "v".to_string(), None).await;
        assert!(matches!(result, Err(CacheError::DiskWriteFailure(_))));

        // Memory is not rolled back
        assert_eq!(cache.memory().retrieve(&"k".to_string()), Some("v".to_string()));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Save("k".to_string()));
        assert!(matches!(event.error, Some(CacheError::DiskWriteFailure(_))));
        assert_eq!(cache.stats().disk_failures, 1);
    }

    #[tokio::test]
    async fn test_save_during_disk_read_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let key = "raced".to_string();

        cache.save(key.clone(), "v1".to_string(), None).await.unwrap();
        cache.memory().remove_all();

        // Queue the disk read, then overwrite before the worker serves it
        let mut read = Box::pin(cache.retrieve(&key));
        assert!(futures::poll!(read.as_mut()).is_pending());
        let write = cache.save(key.clone(), "v2".to_string(), None);

        assert_eq!(read.await.unwrap(), Some("v1".to_string()));
        write.await.unwrap();

        assert_eq!(cache.memory().retrieve(&key), Some("v2".to_string()));
        assert_eq!(cache.retrieve(&key).await.unwrap(), Some("v2".to_string()));
        assert_eq!(cache.stats().promotions, 0);
    }

    #[tokio::test]
    async fn test_remove_during_disk_read_stays_removed() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let key = "raced".to_string();

        cache.save(key.clone(), "v1".to_string(), None).await.unwrap();
        cache.memory().remove_all();

        let mut read = Box::pin(cache.retrieve(&key));
        assert!(futures::poll!(read.as_mut()).is_pending());
        let removal = cache.remove(&key);

        assert_eq!(read.await.unwrap(), Some("v1".to_string()));
        removal.await.unwrap();

        assert_eq!(cache.memory().retrieve(&key), None);
        assert_eq!(cache.retrieve(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_all_during_disk_read_stays_removed() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let key = "raced".to_string();

        cache.save(key.clone(), "v1".to_string(), None).await.unwrap();
        cache.memory().remove_all();

        let mut read = Box::pin(cache.retrieve(&key));
        assert!(futures::poll!(read.as_mut()).is_pending());
        let clearing = cache.remove_all();

        assert_eq!(read.await.unwrap(), Some("v1".to_string()));
        clearing.await.unwrap();

        assert!(cache.memory().is_empty());
        assert_eq!(cache.retrieve(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tiers_agree_on_expired_writes() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::builder()
            .directory(dir.path())
            .memory_expiration(Expiration::Seconds(0.0))
            .clean_interval(Duration::ZERO)
            .build();
        let cache: HybridCache<String, String> = HybridCache::new(config).unwrap();
        let mut events = cache.subscribe();

        // Expired for the memory tier only: neither tier keeps it
        cache.save("k".to_string(), "v".to_string(), None).await.unwrap();
        assert!(cache.memory().is_empty());
        assert_eq!(cache.disk().len().await.unwrap(), 0);
        assert!(events.try_recv().is_err());

        // An explicit expiration applies to both tiers
        cache
            .save("k".to_string(), "v".to_string(), Some(Expiration::Seconds(60.0)))
            .await
            .unwrap();
        assert!(cache.memory().is_cached(&"k".to_string()));
        assert_eq!(cache.disk().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_expired_sweeps_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache
            .save("k".to_string(), "v".to_string(), Some(Expiration::Seconds(0.05)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.remove_expired().await.unwrap(), 2);
        assert!(cache.memory().is_empty());
        assert!(!dir.path().join("k").exists());
    }
}
