//! Configuration for the cache tiers

use crate::cache::entry::Expiration;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Directory name used under the platform cache directory
const DEFAULT_DIRECTORY_NAME: &str = "ouroboros-cache";

/// Configuration for the memory tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum summed cost of all entries (0 = unlimited)
    pub total_cost_limit: usize,

    /// Maximum number of entries (0 = unlimited)
    pub count_limit: usize,

    /// Expiration applied when a write does not specify one
    pub expiration: Expiration,

    /// Interval between expiration sweeps (zero disables the sweeper)
    pub clean_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            total_cost_limit: 0,
            count_limit: 0,
            expiration: Expiration::Never,
            // Sweep every 2 minutes
            clean_interval: Duration::from_secs(120),
        }
    }
}

/// Configuration for the disk tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Directory holding one file per entry
    pub directory: PathBuf,

    /// Expiration applied when a write does not specify one
    pub expiration: Expiration,

    /// Interval between expiration sweeps (zero disables the sweeper)
    pub clean_interval: Duration,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            expiration: Expiration::Never,
            // Sweep every 5 minutes
            clean_interval: Duration::from_secs(300),
        }
    }
}

impl DiskConfig {
    /// Disk configuration rooted at `directory` with default policies
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }
}

/// Platform cache directory, falling back to the temp directory
pub fn default_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_DIRECTORY_NAME)
}

/// Configuration for the two-tier cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory tier settings
    pub memory: MemoryConfig,

    /// Disk tier settings
    pub disk: DiskConfig,

    /// Number of change events buffered per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            disk: DiskConfig::default(),
            event_capacity: 1024,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(CacheError::Config(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        if self.disk.directory.as_os_str().is_empty() {
            return Err(CacheError::Config(
                "disk directory must not be empty".to_string(),
            ));
        }

        for (tier, expiration) in [
            ("memory", &self.memory.expiration),
            ("disk", &self.disk.expiration),
        ] {
            if let Expiration::Seconds(secs) = expiration {
                if !secs.is_finite() {
                    return Err(CacheError::Config(format!(
                        "{} expiration must be a finite number of seconds",
                        tier
                    )));
                }
            }
        }

        Ok(())
    }

    /// Load configuration from the environment, reading a `.env` file if present.
    ///
    /// Recognised variables:
    /// - `OUROBOROS_CACHE_DIR`
    /// - `OUROBOROS_CACHE_COUNT_LIMIT`
    /// - `OUROBOROS_CACHE_COST_LIMIT`
    /// - `OUROBOROS_CACHE_TTL_SECS` (applies to both tiers)
    /// - `OUROBOROS_CACHE_CLEAN_INTERVAL_SECS` (applies to both tiers)
    /// - `OUROBOROS_CACHE_EVENT_CAPACITY`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = CacheConfig::builder();

        if let Some(dir) = lookup("OUROBOROS_CACHE_DIR") {
            builder = builder.directory(dir);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "OUROBOROS_CACHE_COUNT_LIMIT")? {
            builder = builder.count_limit(limit);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "OUROBOROS_CACHE_COST_LIMIT")? {
            builder = builder.total_cost_limit(limit);
        }
        if let Some(secs) = parse_var::<f64>(&lookup, "OUROBOROS_CACHE_TTL_SECS")? {
            builder = builder.expiration(Expiration::Seconds(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "OUROBOROS_CACHE_CLEAN_INTERVAL_SECS")? {
            builder = builder.clean_interval(Duration::from_secs(secs));
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "OUROBOROS_CACHE_EVENT_CAPACITY")? {
            builder = builder.event_capacity(capacity);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CacheError::Config(format!("invalid value for {}: {:?}", name, raw))),
        None => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    directory: Option<PathBuf>,
    total_cost_limit: Option<usize>,
    count_limit: Option<usize>,
    memory_expiration: Option<Expiration>,
    disk_expiration: Option<Expiration>,
    memory_clean_interval: Option<Duration>,
    disk_clean_interval: Option<Duration>,
    event_capacity: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set the disk tier directory
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the memory tier cost limit
    pub fn total_cost_limit(mut self, limit: usize) -> Self {
        self.total_cost_limit = Some(limit);
        self
    }

    /// Set the memory tier entry-count limit
    pub fn count_limit(mut self, limit: usize) -> Self {
        self.count_limit = Some(limit);
        self
    }

    /// Set the default expiration for both tiers
    pub fn expiration(mut self, expiration: Expiration) -> Self {
        self.memory_expiration = Some(expiration);
        self.disk_expiration = Some(expiration);
        self
    }

    /// Set the default expiration for the memory tier only
    pub fn memory_expiration(mut self, expiration: Expiration) -> Self {
        self.memory_expiration = Some(expiration);
        self
    }

    /// Set the default expiration for the disk tier only
    pub fn disk_expiration(mut self, expiration: Expiration) -> Self {
        self.disk_expiration = Some(expiration);
        self
    }

    /// Set the sweep interval for both tiers
    pub fn clean_interval(mut self, interval: Duration) -> Self {
        self.memory_clean_interval = Some(interval);
        self.disk_clean_interval = Some(interval);
        self
    }

    /// Set the sweep interval for the memory tier only
    pub fn memory_clean_interval(mut self, interval: Duration) -> Self {
        self.memory_clean_interval = Some(interval);
        self
    }

    /// Set the sweep interval for the disk tier only
    pub fn disk_clean_interval(mut self, interval: Duration) -> Self {
        self.disk_clean_interval = Some(interval);
        self
    }

    /// Set the change event buffer size
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            memory: MemoryConfig {
                total_cost_limit: self
                    .total_cost_limit
                    .unwrap_or(defaults.memory.total_cost_limit),
                count_limit: self.count_limit.unwrap_or(defaults.memory.count_limit),
                expiration: self
                    .memory_expiration
                    .unwrap_or(defaults.memory.expiration),
                clean_interval: self
                    .memory_clean_interval
                    .unwrap_or(defaults.memory.clean_interval),
            },
            disk: DiskConfig {
                directory: self.directory.unwrap_or(defaults.disk.directory),
                expiration: self.disk_expiration.unwrap_or(defaults.disk.expiration),
                clean_interval: self
                    .disk_clean_interval
                    .unwrap_or(defaults.disk.clean_interval),
            },
            event_capacity: self.event_capacity.unwrap_or(defaults.event_capacity),
        }
    }
}
