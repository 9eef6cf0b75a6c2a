use crate::state::CrawlState;
use crate::storage::atomic::{self, write_atomic};
use crate::storage::traits::{StateStore, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current on-disk format version
pub const STATE_FORMAT_VERSION: u32 = 1;

/// On-disk envelope written by `save`
#[derive(Serialize)]
struct StateFileRef<'a> {
    version: u32,
    checksum: String,
    state: &'a CrawlState,
}

/// On-disk envelope read by `load`
///
/// `state` stays untyped until the version has been checked.
#[derive(Deserialize)]
struct StateFile {
    version: u32,
    checksum: String,
    state: serde_json::Value,
}

/// JSON file backend with checksum verification and atomic replace
///
/// Writes go to `<file>.tmp`, are flushed to disk, then renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        atomic::tmp_path(&self.path)
    }
}

/// Hex-encoded SHA-256 of the canonical JSON form of a state
pub fn state_checksum(state: &CrawlState) -> StorageResult<String> {
    let bytes = serde_json::to_vec(state)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl StateStore for JsonStateStore {
    fn load(&self) -> StorageResult<Option<CrawlState>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: StateFile = serde_json::from_slice(&bytes)?;
        if file.version != STATE_FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: file.version,
                expected: STATE_FORMAT_VERSION,
            });
        }

        let state: CrawlState = serde_json::from_value(file.state)?;
        let computed = state_checksum(&state)?;
        if computed != file.checksum {
            return Err(StorageError::ChecksumMismatch {
                stored: file.checksum,
                computed,
            });
        }

        state.check_consistency().map_err(StorageError::Inconsistent)?;

        debug!(
            "Loaded state from {}: {} pending, {} visited",
            self.path.display(),
            state.pending.len(),
            state.visited.len()
        );
        Ok(Some(state))
    }

    fn save(&self, state: &CrawlState) -> StorageResult<()> {
        let file = StateFileRef {
            version: STATE_FORMAT_VERSION,
            checksum: state_checksum(state)?,
            state,
        };
        let encoded = serde_json::to_vec_pretty(&file)?;

        write_atomic(&self.path, &encoded)?;

        debug!(
            "Saved state to {}: {} pending, {} visited",
            self.path.display(),
            state.pending.len(),
            state.visited.len()
        );
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        for path in [self.path.clone(), self.tmp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FailureKind, FailureRecord, PageTask};
    use tempfile::TempDir;
    use url::Url;

    fn sample_state() -> CrawlState {
        let seed = PageTask::listing(Url::parse("https://example.com/store").unwrap(), 0);
        let mut state = CrawlState::seeded("https://example.com", seed);
        state
            .pending
            .push(PageTask::product(Url::parse("https://example.com/product/b").unwrap(), 1));
        state
            .visited
            .insert("https://example.com/product/a".to_string());
        state.counters.pages_fetched = 3;
        state.counters.products_found = 1;
        state.record_failure(FailureRecord {
            url: "https://example.com/product/gone".to_string(),
            kind: FailureKind::Permanent,
            reason: "HTTP 404".to_string(),
            attempts: 1,
            status: Some(404),
        });
        state
    }

    fn store_in(dir: &TempDir) -> JsonStateStore {
        JsonStateStore::new(dir.path().join(".crawl_state.json"))
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let state = sample_state();

        store.save(&state).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut state = sample_state();
        store.save(&state).unwrap();

        state.pending.clear();
        state.counters.pages_fetched = 10;
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.pending.is_empty());
        assert_eq!(loaded.counters.pages_fetched, 10);
    }

    #[test]
    fn test_stale_tmp_file_does_not_affect_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let state = sample_state();
        store.save(&state).unwrap();

        // A crash mid-write leaves a partial temp file behind
        fs::write(store.tmp_path(), b"{\"version\":1,\"chec").unwrap();
        assert_eq!(store.load().unwrap().unwrap(), state);
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"not json at all").unwrap();
        assert!(matches!(store.load(), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_tampered_state_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample_state()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let tampered = text.replace("\"pages_fetched\": 3", "\"pages_fetched\": 4");
        assert_ne!(text, tampered);
        fs::write(store.path(), tampered).unwrap();

        assert!(matches!(
            store.load(),
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            br#"{"version": 7, "checksum": "00", "state": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load(),
            Err(StorageError::UnsupportedVersion { found: 7, .. })
        ));
    }

    #[test]
    fn test_inconsistent_state_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut state = sample_state();
        state
            .visited
            .insert("https://example.com/product/b".to_string());
        store.save(&state).unwrap();

        assert!(matches!(store.load(), Err(StorageError::Inconsistent(_))));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample_state()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_none());

        // Clearing twice is fine
        store.clear().unwrap();
    }
}
