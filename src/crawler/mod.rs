//! Crawler module: the crawl engine
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry and backoff
//! - Global request pacing
//! - Frontier management and dispatch limits
//! - Workers that fetch and parse one task each
//! - Overall crawl coordination and shutdown

mod coordinator;
mod fetcher;
mod pacer;
mod retry;
mod scheduler;
mod shutdown;
mod worker;

pub use coordinator::Coordinator;
pub use fetcher::{
    build_http_client, FetchExecutor, FetchOutcome, HttpResponse, ReqwestTransport, RetriedFetch,
    Transport, TransportError,
};
pub use pacer::Pacer;
pub use retry::{RetryPolicy, RetryState, Sleeper, TokioSleeper};
pub use scheduler::{Frontier, Scheduler};
pub use shutdown::ShutdownSignal;
pub use worker::{process_task, TaskReport, TaskResult, WorkerContext};

#[cfg(test)]
pub(crate) use fetcher::testing;

use crate::config::Config;
use crate::output::CrawlReport;
use crate::Result;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load the saved state, or seed a fresh one
/// 2. Check that the storefront answers
/// 3. Fetch and parse pages until the frontier is empty or `max-pages`
///    dispatches have been made
/// 4. Save the final state and write the CSV export and report
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `force` - Discard saved state and start a fresh catalog
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl finished (possibly with recorded page errors)
/// * `Err(CrawlError)` - A fatal condition stopped the crawl
pub async fn crawl(config: Config, force: bool) -> Result<CrawlReport> {
    Coordinator::new(config, force)?.run().await
}
