//! Change notifications emitted by the two-tier cache

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change happened
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind<K> {
    /// A value was written under the key
    Save(K),

    /// The key was removed
    Remove(K),

    /// Every entry was removed
    RemoveAll,
}

impl<K> ChangeKind<K> {
    /// Key affected by the change, if it concerns a single key
    pub fn key(&self) -> Option<&K> {
        match self {
            ChangeKind::Save(key) | ChangeKind::Remove(key) => Some(key),
            ChangeKind::RemoveAll => None,
        }
    }
}

impl<K: fmt::Display> fmt::Display for ChangeKind<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Save(key) => write!(f, "save {}", key),
            ChangeKind::Remove(key) => write!(f, "remove {}", key),
            ChangeKind::RemoveAll => write!(f, "remove all"),
        }
    }
}

/// Outcome of a write or removal, published once its disk leg completes
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<K, V> {
    /// The change that was attempted
    pub kind: ChangeKind<K>,

    /// Affected value (saved value, or value held before removal)
    pub value: Option<V>,

    /// Set when the disk leg of the operation failed
    pub error: Option<CacheError>,

    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl<K, V> ChangeEvent<K, V> {
    /// Create a successful event
    pub fn new(kind: ChangeKind<K>, value: Option<V>) -> Self {
        Self {
            kind,
            value,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a failure event
    pub fn failed(kind: ChangeKind<K>, error: CacheError) -> Self {
        Self {
            kind,
            value: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    /// Check if the operation behind this event succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_key() {
        assert_eq!(ChangeKind::Save("a").key(), Some(&"a"));
        assert_eq!(ChangeKind::Remove("b").key(), Some(&"b"));
        assert_eq!(ChangeKind::<&str>::RemoveAll.key(), None);
    }

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::Save("user:1").to_string(), "save user:1");
        assert_eq!(ChangeKind::<&str>::RemoveAll.to_string(), "remove all");
    }

    #[test]
    fn test_failed_event() {
        let event: ChangeEvent<&str, u32> = ChangeEvent::failed(
            ChangeKind::Remove("k"),
            CacheError::DiskRemoveFailure("busy".to_string()),
        );

        assert!(!event.is_success());
        assert!(event.value.is_none());
        assert!(matches!(event.error, Some(CacheError::DiskRemoveFailure(_))));
    }

    #[test]
    fn test_successful_event() {
        let event = ChangeEvent::new(ChangeKind::Save("k"), Some(7));
        assert!(event.is_success());
        assert_eq!(event.value, Some(7));
    }
}
