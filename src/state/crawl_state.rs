use crate::state::{FailureKind, PageTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Aggregate counters carried across runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlCounters {
    /// Tasks handed to a worker, over all runs; `max-pages` caps this
    pub pages_dispatched: u64,
    pub pages_fetched: u64,
    pub products_found: u64,
    pub listings_processed: u64,
    pub skipped_links: u64,
    pub images_downloaded: u64,
    pub images_failed: u64,
    pub errors: BTreeMap<FailureKind, u64>,
}

impl CrawlCounters {
    pub fn errors_total(&self) -> u64 {
        self.errors.values().sum()
    }

    pub fn record_error(&mut self, kind: FailureKind) {
        *self.errors.entry(kind).or_insert(0) += 1;
    }
}

/// A terminally failed task, kept for the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub kind: FailureKind,
    pub reason: String,
    pub attempts: u32,
    #[serde(default)]
    pub status: Option<u16>,
}

/// Persisted snapshot of crawl progress
///
/// Holds everything needed to resume: the pending tasks, the visited set
/// and the counters. A valid state never lists a URL as both visited and
/// pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    pub base_url: String,
    pub pending: Vec<PageTask>,
    pub visited: BTreeSet<String>,
    #[serde(default)]
    pub counters: CrawlCounters,
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlState {
    /// Creates an empty state for a fresh crawl of `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            pending: Vec::new(),
            visited: BTreeSet::new(),
            counters: CrawlCounters::default(),
            failures: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Creates a fresh state seeded with one task
    pub fn seeded(base_url: impl Into<String>, seed: PageTask) -> Self {
        let mut state = Self::new(base_url);
        state.pending.push(seed);
        state
    }

    /// True when there is nothing left to dispatch
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Records a terminal failure in both the counters and the failure list
    pub fn record_failure(&mut self, failure: FailureRecord) {
        self.counters.record_error(failure.kind);
        self.failures.push(failure);
    }

    /// Checks the structural invariants of a loaded snapshot
    ///
    /// Returns a description of the first violation found.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut pending_keys: HashSet<&str> = HashSet::with_capacity(self.pending.len());
        for task in &self.pending {
            if self.visited.contains(task.key()) {
                return Err(format!("{} is both visited and pending", task.key()));
            }
            if !pending_keys.insert(task.key()) {
                return Err(format!("{} is pending more than once", task.key()));
            }
        }
        Ok(())
    }
}
