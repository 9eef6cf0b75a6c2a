//! Storage module for persisting crawl state
//!
//! This module handles the resume snapshot of the crawler:
//! - Checksummed JSON state file (`.crawl_state.json`)
//! - Atomic write-then-rename saves, shared with the output files
//! - Degrading untrusted snapshots to a fresh crawl

mod atomic;
mod json_store;
mod traits;

pub(crate) use atomic::write_atomic;
pub use json_store::{state_checksum, JsonStateStore, STATE_FORMAT_VERSION};
pub use traits::{StateStore, StorageError, StorageResult};

use crate::state::CrawlState;
use std::path::Path;
use tracing::warn;

/// Opens the state store backing a crawl output directory
pub fn open_state_store(path: &Path) -> JsonStateStore {
    JsonStateStore::new(path)
}

/// Loads a snapshot that can be resumed against `base_url`
///
/// Any snapshot that cannot be trusted (unreadable, corrupt, inconsistent,
/// or taken for a different site) is reported with a warning and ignored.
/// State problems never abort a crawl.
pub fn load_resumable<S: StateStore>(store: &S, base_url: &str) -> Option<CrawlState> {
    match store.load() {
        Ok(Some(state)) if state.base_url == base_url => Some(state),
        Ok(Some(state)) => {
            warn!(
                "Ignoring saved state for {} (configured base URL is {}); starting a fresh crawl",
                state.base_url, base_url
            );
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Saved crawl state is unusable ({}); starting a fresh crawl", e);
            None
        }
    }
}
