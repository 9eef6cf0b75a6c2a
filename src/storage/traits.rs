//! Storage traits and error types
//!
//! This module defines the trait interface for crawl state backends and
//! associated error types.

use crate::state::CrawlState;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported state file version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("State checksum mismatch (stored {stored}, computed {computed})")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("Inconsistent state: {0}")]
    Inconsistent(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for crawl state backends
///
/// A backend holds at most one snapshot. `save` must be atomic: a crash at
/// any point leaves either the previous snapshot or the new one, never a
/// mix of both.
pub trait StateStore {
    /// Loads the stored snapshot
    ///
    /// Returns `Ok(None)` when nothing has been saved yet, and an error when
    /// a snapshot exists but cannot be trusted.
    fn load(&self) -> StorageResult<Option<CrawlState>>;

    /// Replaces the stored snapshot with `state`
    fn save(&self, state: &CrawlState) -> StorageResult<()>;

    /// Removes the stored snapshot, if any
    fn clear(&self) -> StorageResult<()>;
}
