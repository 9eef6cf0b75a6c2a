//! Worker side of the crawl loop
//!
//! A worker fetches one task, parses the body and reports back. It never
//! touches the frontier or the crawl state: everything it learns travels in
//! the returned `TaskReport`.

use crate::catalog::ProductRecord;
use crate::crawler::fetcher::{FetchExecutor, FetchOutcome};
use crate::crawler::pacer::Pacer;
use crate::output::{ImageDownloader, ImageStats};
use crate::parser::{ListingPage, PageParser, ParsedPage};
use crate::state::{FailureKind, PageKind, PageTask};
use crate::url::{normalize_url, same_site};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Shared, read-only dependencies of every worker
pub struct WorkerContext {
    pub executor: FetchExecutor,
    pub pacer: Arc<Pacer>,
    pub parser: PageParser,
    pub base_url: Url,
    pub images: Option<ImageDownloader>,
}

/// What a task resolved to
#[derive(Debug, Clone)]
pub enum TaskResult {
    Listing(ListingPage),
    Product(Box<ProductRecord>),
    Failed {
        kind: FailureKind,
        reason: String,
        status: Option<u16>,
    },
}

/// Outcome of one task, handed back to the coordinator
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// The task, with `attempts` including this dispatch
    pub task: PageTask,
    pub result: TaskResult,
    /// Attempts made by this dispatch
    pub attempts: u32,
    /// True if a response body was received
    pub fetched: bool,
    pub images: ImageStats,
}

/// Fetches, parses and (optionally) downloads images for one task
///
/// The caller has already taken the task's pacer slot.
pub async fn process_task(ctx: Arc<WorkerContext>, mut task: PageTask) -> TaskReport {
    debug!("Fetching {} ({}, depth {})", task.url, task.kind, task.depth);

    let fetched = ctx.executor.fetch_with_retry(&task.url, &ctx.pacer).await;
    let attempts = fetched.attempts;
    task.attempts = task.attempts.saturating_add(attempts);

    let (final_url, body) = match fetched.outcome {
        FetchOutcome::Success {
            final_url, body, ..
        } => (final_url, body),
        FetchOutcome::TransientFailure { reason, status } => {
            return failed(task, attempts, FailureKind::RetriesExhausted, reason, status);
        }
        FetchOutcome::PermanentFailure { reason, status } => {
            return failed(task, attempts, FailureKind::Permanent, reason, status);
        }
    };

    let page_url = effective_url(&task, &final_url, &ctx.base_url);
    let body = String::from_utf8_lossy(&body);

    // Relative links resolve against the served URL, not the normalized key.
    // The parsed DOM is not Send; it must be dropped before the next await
    let parsed = ctx.parser.parse(task.kind, &body, &page_url, &final_url);

    let (result, images) = match parsed {
        Ok(ParsedPage::Listing(page)) => (TaskResult::Listing(page), ImageStats::default()),
        Ok(ParsedPage::Product(record)) => {
            let images = match &ctx.images {
                Some(downloader) => {
                    downloader
                        .download_all(&record, &ctx.executor, &ctx.pacer)
                        .await
                }
                None => ImageStats::default(),
            };
            (TaskResult::Product(record), images)
        }
        Err(e) => (
            TaskResult::Failed {
                kind: FailureKind::ParseFailure,
                reason: e.to_string(),
                status: None,
            },
            ImageStats::default(),
        ),
    };

    TaskReport {
        task,
        result,
        attempts,
        fetched: true,
        images,
    }
}

fn failed(
    task: PageTask,
    attempts: u32,
    kind: FailureKind,
    reason: String,
    status: Option<u16>,
) -> TaskReport {
    TaskReport {
        task,
        result: TaskResult::Failed {
            kind,
            reason,
            status,
        },
        attempts,
        fetched: false,
        images: ImageStats::default(),
    }
}

/// The URL a page is parsed as
///
/// Same-site redirects are followed to their normalized target (without
/// query for product pages); anything else keeps the task URL.
fn effective_url(task: &PageTask, final_url: &Url, base_url: &Url) -> Url {
    if *final_url == task.url || !same_site(final_url, base_url) {
        return task.url.clone();
    }
    match normalize_url(final_url.as_str()) {
        Ok(mut url) => {
            if task.kind == PageKind::Product {
                url.set_query(None);
            }
            url
        }
        Err(_) => task.url.clone(),
    }
}
