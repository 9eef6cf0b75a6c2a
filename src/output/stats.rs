//! Human-readable crawl summary
//!
//! Prints a `CrawlReport` to stdout, after a crawl or from an existing
//! `report.json`.

use crate::output::CrawlReport;
use crate::state::FailureKind;

/// Prints a report to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Site:");
    println!("  Base URL: {}", report.base_url);
    println!("  Start path: {}", report.start_path);
    println!(
        "  Stopped: {} after {:.1}s",
        report.stop_reason.as_str(),
        report.elapsed_secs
    );
    println!();

    println!("Overview:");
    println!("  Products in catalog: {}", report.products_found);
    println!("  New products this run: {}", report.new_products);
    println!("  Pages fetched: {}", report.pages_fetched);
    println!("  Listings processed: {}", report.listings_processed);
    println!(
        "  Dispatched: {} this run, {} total",
        report.pages_dispatched_run, report.pages_dispatched_total
    );
    println!("  Still pending: {}", report.pending_remaining);
    println!("  Skipped links: {}", report.skipped_links);
    if report.settings.download_images {
        println!(
            "  Images: {} downloaded, {} failed",
            report.images_downloaded, report.images_failed
        );
    }
    println!();

    if report.errors_total > 0 {
        println!("Errors ({}):", report.errors_total);
        let mut error_counts: Vec<_> = report.errors.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in error_counts {
            println!("  {}: {}", kind.as_str(), count);
        }
        println!();
    }

    println!("Success Rate: {:.1}%", success_rate(report));
    println!();

    println!("Files:");
    println!("  {}", report.files.catalog_jsonl.display());
    println!("  {}", report.files.catalog_csv.display());
    println!("  {}", report.files.report.display());
}

/// Share of resolved pages that produced no recorded failure, in percent
///
/// Parse failures were fetched, so they are counted once.
pub fn success_rate(report: &CrawlReport) -> f64 {
    let parse_failures = report.error_count(FailureKind::ParseFailure);
    let fetch_failures = report.errors_total.saturating_sub(parse_failures);
    let resolved = report.pages_fetched + fetch_failures;
    if resolved == 0 {
        return 0.0;
    }
    let succeeded = report.pages_fetched.saturating_sub(parse_failures);
    (succeeded as f64 / resolved as f64) * 100.0
}
