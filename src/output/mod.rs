//! Output module for the collected catalog and crawl reports
//!
//! This module handles:
//! - Appending product records to `catalog.jsonl` as they are parsed
//! - Exporting the whole catalog to `catalog.csv` at finalize
//! - Writing the `report.json` crawl report
//! - Downloading referenced product images
//! - Printing a human-readable summary

mod csv_export;
mod images;
mod jsonl;
mod report;
pub mod stats;

pub use csv_export::{write_csv, CSV_COLUMNS};
pub use images::{image_file_name, ImageDownloader, ImageStats};
pub use jsonl::{read_catalog, CatalogWriter};
pub use report::{CrawlReport, ReportFiles, ReportSettings, StopReason};
pub use stats::print_report;

use thiserror::Error;

/// Errors that can occur while writing output files
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Produces the end-of-crawl files from the catalog on disk
///
/// Every record in `catalog.jsonl` is exported, including those appended by
/// earlier runs, and `products_found` is set to that count.
///
/// # Arguments
///
/// * `files` - Paths of the catalog, CSV and report files
/// * `report` - The report to complete and write
///
/// # Returns
///
/// The report as written
pub fn finalize(files: &ReportFiles, mut report: CrawlReport) -> OutputResult<CrawlReport> {
    let records = read_catalog(&files.catalog_jsonl)?;
    write_csv(&files.catalog_csv, &records)?;

    report.products_found = records.len() as u64;
    report.write(&files.report)?;

    tracing::info!(
        "Wrote {} records to {} and report to {}",
        records.len(),
        files.catalog_csv.display(),
        files.report.display()
    );
    Ok(report)
}
