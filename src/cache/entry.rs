//! Cache entry management with expiration support

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// When a cache entry stops being served
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expiration {
    /// The entry never expires
    #[default]
    Never,

    /// The entry expires this many seconds after it was added
    Seconds(f64),

    /// The entry expires at an absolute point in time
    Date(DateTime<Utc>),
}

impl Expiration {
    /// Time-to-live expiration from a `Duration`
    pub fn after(ttl: Duration) -> Self {
        Expiration::Seconds(ttl.as_secs_f64())
    }

    /// Absolute deadline for an entry added at `added_at`, `None` if it never expires
    pub fn deadline(&self, added_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Expiration::Never => None,
            Expiration::Seconds(secs) => {
                let nanos = (secs * 1_000_000_000.0) as i64;
                added_at.checked_add_signed(chrono::Duration::nanoseconds(nanos))
            }
            Expiration::Date(date) => Some(date),
        }
    }

    /// Check whether an entry added at `added_at` is expired at `now`
    pub fn is_expired(&self, added_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.deadline(added_at) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Whether a write using this policy would be dead on arrival.
    ///
    /// Such writes are dropped without creating an entry.
    pub fn is_expired_on_arrival(&self) -> bool {
        self.is_expired_on_arrival_at(Utc::now())
    }

    /// Whether a write arriving at `now` would be dead on arrival
    pub fn is_expired_on_arrival_at(&self, now: DateTime<Utc>) -> bool {
        match *self {
            Expiration::Never => false,
            Expiration::Seconds(secs) => secs.is_nan() || secs <= 0.0,
            Expiration::Date(date) => date <= now,
        }
    }
}

/// A stored value together with its expiration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,

    /// Expiration policy
    pub expiration: Expiration,

    /// When the entry was created
    pub added_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// Create a new entry stamped with the current time
    pub fn new(value: V, expiration: Expiration) -> Self {
        Self::with_added_at(value, expiration, Utc::now())
    }

    /// Create an entry with an explicit insertion time
    pub fn with_added_at(value: V, expiration: Expiration, added_at: DateTime<Utc>) -> Self {
        Self {
            value,
            expiration,
            added_at,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check if the entry is expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_expired(self.added_at, now)
    }

    /// Absolute expiration time, if any
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.expiration.deadline(self.added_at)
    }

    /// Get time until expiration (`None` once expired or when it never expires)
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let deadline = self.deadline()?;
        (deadline - Utc::now()).to_std().ok()
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.added_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }
}

impl<V: Serialize> CacheEntry<V> {
    /// Encode the entry into its durable byte form
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::EncodingFailed(e.to_string()))
    }
}

impl<V: DeserializeOwned> CacheEntry<V> {
    /// Decode an entry previously produced by [`CacheEntry::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::DecodingFailed(e.to_string()))
    }
}
