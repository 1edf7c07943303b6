//! # Two-Tier Cache
//!
//! A key/value cache with a bounded in-memory tier in front of a durable
//! on-disk tier.
//!
//! ## Features
//!
//! - **Per-entry expiration**: never, a time-to-live, or an absolute deadline
//! - **Bounded memory tier**: entry-count and cost limits with LRU eviction
//! - **Disk tier**: one JSON file per key, written through a single worker
//! - **Read-through promotion**: disk hits are copied back into memory
//! - **Background sweeps**: both tiers periodically drop expired entries
//! - **Change stream**: every write and removal is broadcast to subscribers
//!
//! ## Example
//!
//! ```no_run
//! use ouroboros_cache::cache::{CacheConfig, Expiration, HybridCache};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .directory("/var/cache/my-app")
//!     .count_limit(10_000)
//!     .clean_interval(Duration::from_secs(60))
//!     .build();
//!
//! let cache: HybridCache<String, String> = HybridCache::new(config)?;
//!
//! // Memory is updated immediately; awaiting waits for the disk write
//! cache
//!     .save("user:42".to_string(), "Ada".to_string(), Some(Expiration::Seconds(3600.0)))
//!     .await?;
//!
//! if let Some(name) = cache.retrieve(&"user:42".to_string()).await? {
//!     println!("Cache hit: {}", name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disk;
pub mod entry;
pub mod event;
pub mod key;
pub mod memory;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder, DiskConfig, MemoryConfig};
pub use disk::{DiskStorage, Pending};
pub use entry::{CacheEntry, Expiration};
pub use event::{ChangeEvent, ChangeKind};
pub use key::CacheKey;
pub use memory::MemoryStorage;
pub use store::HybridCache;
pub use types::CacheStats;
