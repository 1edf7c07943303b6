//! Error types for cache operations
//!
//! This module defines the error taxonomy shared by both cache tiers.
//! Memory tier operations never fail; disk tier operations surface these
//! errors either to the caller (reads) or through their completion signal
//! (writes and removals).

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The persisted entry is missing or could not be read
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// An entry could not be converted into its durable form
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Persisted bytes could not be converted back into an entry
    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    /// Writing an entry to disk failed
    #[error("Disk write failure: {0}")]
    DiskWriteFailure(String),

    /// Deleting one or more entries from disk failed
    #[error("Disk remove failure: {0}")]
    DiskRemoveFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unclassified failure
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl CacheError {
    /// Whether this error only means "nothing is stored under that key"
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Unknown(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Unknown(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::NotFound("user-42".to_string());
        assert_eq!(error.to_string(), "Entry not found: user-42");

        let error = CacheError::DiskWriteFailure("permission denied".to_string());
        assert!(error.to_string().contains("permission denied"));

        let error = CacheError::DecodingFailed("expected value".to_string());
        assert!(error.to_string().starts_with("Decoding failed"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Unknown(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Unknown(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(CacheError::NotFound("k".into()).is_not_found());
        assert!(!CacheError::DecodingFailed("k".into()).is_not_found());
    }
}
