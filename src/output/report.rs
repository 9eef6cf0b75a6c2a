use crate::config::Config;
use crate::output::OutputResult;
use crate::storage::write_atomic;
use crate::state::{FailureKind, FailureRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Why a run stopped dispatching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The frontier was exhausted
    Completed,

    /// The `max-pages` ceiling was reached
    MaxPages,

    /// The operator interrupted the crawl
    Interrupted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::MaxPages => "max_pages",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Output file locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFiles {
    pub catalog_jsonl: PathBuf,
    pub catalog_csv: PathBuf,
    pub report: PathBuf,
    pub state: PathBuf,
}

impl ReportFiles {
    pub fn from_config(config: &Config) -> Self {
        Self {
            catalog_jsonl: config.catalog_path(),
            catalog_csv: config.csv_path(),
            report: config.report_path(),
            state: config.state_path(),
        }
    }
}

/// Settings the run was made with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub concurrency: usize,
    pub delay_secs: f64,
    pub timeout_secs: f64,
    pub retries: u32,
    pub max_pages: Option<u64>,
    pub download_images: bool,
    pub user_agent: String,
}

impl ReportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.crawler.concurrency,
            delay_secs: config.crawler.delay_secs,
            timeout_secs: config.crawler.timeout_secs,
            retries: config.crawler.retries,
            max_pages: config.crawler.max_pages,
            download_images: config.output.download_images,
            user_agent: config.user_agent.header_value(),
        }
    }
}

/// Summary of a crawl, written to `report.json` once per run
///
/// Counters are cumulative over every run of the crawl; `new_products` and
/// `pages_dispatched_run` cover this run only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub base_url: String,
    pub start_path: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub stop_reason: StopReason,

    pub pages_fetched: u64,
    pub products_found: u64,
    pub new_products: u64,
    pub listings_processed: u64,
    pub pages_dispatched_run: u64,
    pub pages_dispatched_total: u64,
    pub pending_remaining: usize,
    pub skipped_links: u64,
    pub images_downloaded: u64,
    pub images_failed: u64,

    pub errors_total: u64,
    pub errors: BTreeMap<FailureKind, u64>,
    pub failures: Vec<FailureRecord>,

    pub files: ReportFiles,
    pub settings: ReportSettings,
}

impl CrawlReport {
    /// Writes the report as pretty JSON, atomically
    pub fn write(&self, path: &Path) -> OutputResult<()> {
        let encoded = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &encoded)?;
        Ok(())
    }

    pub fn load(path: &Path) -> OutputResult<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn error_count(&self, kind: FailureKind) -> u64 {
        self.errors.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn sample_report(config: &Config) -> CrawlReport {
        let now = Utc::now();
        CrawlReport {
            base_url: config.site.base_url.clone(),
            start_path: config.site.start_path.clone(),
            started_at: now,
            completed_at: now,
            elapsed_secs: 1.5,
            stop_reason: StopReason::Completed,
            pages_fetched: 4,
            products_found: 3,
            new_products: 3,
            listings_processed: 1,
            pages_dispatched_run: 4,
            pages_dispatched_total: 4,
            pending_remaining: 0,
            skipped_links: 0,
            images_downloaded: 0,
            images_failed: 0,
            errors_total: 0,
            errors: BTreeMap::new(),
            failures: Vec::new(),
            files: ReportFiles::from_config(config),
            settings: ReportSettings::from_config(config),
        }
    }

    #[test]
    fn test_report_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let mut report = sample_report(&Config::default());
        report.stop_reason = StopReason::MaxPages;
        report.errors.insert(FailureKind::Permanent, 1);

        report.write(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"stop_reason\": \"max_pages\""));
        assert!(text.contains("\"permanent\": 1"));

        let loaded = CrawlReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.error_count(FailureKind::Permanent), 1);
        assert_eq!(loaded.error_count(FailureKind::ParseFailure), 0);
    }
}
