//! # Ouroboros Cache (ouroboros-cache)
//!
//! A two-tier key/value cache for Rust: a bounded in-memory tier backed by a
//! directory of files, with per-entry expiration and a change-notification
//! stream.
//!
//! ## Features
//!
//! - Memory and disk tiers usable on their own or composed in [`HybridCache`]
//! - Time-to-live and absolute-deadline expiration with background sweeps
//! - Async-first design using tokio
//! - Broadcast change events for every save and removal
//! - Configuration via builder or environment variables
//!
//! ## Quick Start
//!
//! ```no_run
//! use ouroboros_cache::{CacheConfig, HybridCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache: HybridCache<String, Vec<u8>> = HybridCache::new(CacheConfig::from_env()?)?;
//!     let mut events = cache.subscribe();
//!
//!     cache.save("avatar/7".to_string(), vec![1, 2, 3], None).await?;
//!
//!     let event = events.recv().await?;
//!     println!("{} succeeded: {}", event.kind, event.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Using a Single Tier
//!
//! ```no_run
//! use ouroboros_cache::{DiskConfig, DiskStorage, Expiration};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let disk: DiskStorage<u64, String> = DiskStorage::new(DiskConfig::in_directory("/tmp/blobs"))?;
//!
//!     disk.save(&7, "seven".to_string(), Some(Expiration::Seconds(30.0))).await?;
//!     assert_eq!(disk.retrieve(&7).await?, Some("seven".to_string()));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheStats, ChangeEvent, ChangeKind,
    DiskConfig, DiskStorage, Expiration, HybridCache, MemoryConfig, MemoryStorage, Pending,
};
pub use error::{CacheError, Result};
