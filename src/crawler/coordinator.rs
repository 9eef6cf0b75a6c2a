//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Loading or seeding the crawl state
//! - Dispatching paced tasks to a bounded worker pool
//! - Applying worker outcomes to the frontier, counters and catalog
//! - Periodic and final state snapshots
//! - Handling interrupts and the `max-pages` ceiling
//! - Generating final output
//!
//! Only the coordinator mutates the frontier and the crawl state. Workers
//! run as tasks in a `JoinSet` and report back through their return value.

use crate::config::Config;
use crate::crawler::fetcher::{FetchExecutor, ReqwestTransport, Transport};
use crate::crawler::pacer::Pacer;
use crate::crawler::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::crawler::scheduler::{Frontier, Scheduler};
use crate::crawler::shutdown::ShutdownSignal;
use crate::crawler::worker::{process_task, TaskReport, TaskResult, WorkerContext};
use crate::output::{
    self, CatalogWriter, CrawlReport, ImageDownloader, OutputError, ReportFiles, ReportSettings,
    StopReason,
};
use crate::parser::PageParser;
use crate::state::{CrawlState, FailureRecord, PageKind, PageTask};
use crate::storage::{load_resumable, open_state_store, JsonStateStore, StateStore};
use crate::url::normalize_url;
use crate::{CrawlError, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    force: bool,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    shutdown: ShutdownSignal,
}

impl Coordinator {
    /// Creates a coordinator that talks to the network through reqwest
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `force` - Discard any saved state and start a fresh catalog
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - The HTTP client could not be built
    pub fn new(config: Config, force: bool) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config)?;
        Ok(Self::with_transport(
            config,
            force,
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    /// Creates a coordinator over an arbitrary transport and sleeper
    pub fn with_transport(
        config: Config,
        force: bool,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            force,
            transport,
            sleeper,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Replaces the stop signal, e.g. with one wired to Ctrl-C
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// A handle that stops the crawl when triggered
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Runs the crawl to completion, interruption or the page ceiling
    ///
    /// Page-level failures never end the run; only the fatal conditions of
    /// `CrawlError` do, and those are detected before any page is fetched
    /// (except a failure to write the state snapshot or the catalog).
    pub async fn run(self) -> Result<CrawlReport> {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let config = Arc::clone(&self.config);

        let base_url = config.base_url()?;
        let base_key = base_url.to_string();
        let files = ReportFiles::from_config(&config);

        std::fs::create_dir_all(&config.output.dir).map_err(|source| {
            CrawlError::OutputUnwritable {
                path: config.output.dir.clone(),
                source,
            }
        })?;

        let store = open_state_store(&files.state);
        if self.force {
            info!("Forced fresh crawl: discarding saved state and catalog");
            store.clear()?;
        }

        let state = match load_resumable(&store, &base_key) {
            Some(state) => {
                info!(
                    "Resuming crawl of {}: {} pending, {} visited, {} dispatched so far",
                    base_key,
                    state.pending.len(),
                    state.visited.len(),
                    state.counters.pages_dispatched
                );
                state
            }
            None => {
                let seed = normalize_url(config.start_url()?.as_str())?;
                info!("Starting fresh crawl of {} from {}", base_key, seed);
                CrawlState::seeded(base_key.clone(), PageTask::listing(seed, 0))
            }
        };

        let catalog = CatalogWriter::open(&files.catalog_jsonl, self.force).map_err(|e| {
            match e {
                OutputError::Io(source) => CrawlError::OutputUnwritable {
                    path: files.catalog_jsonl.clone(),
                    source,
                },
                other => CrawlError::Output(other),
            }
        })?;

        if !state.is_complete() {
            match self.transport.head(&base_url, config.timeout()).await {
                Ok(status) => debug!("Pre-flight HEAD of {} answered HTTP {}", base_url, status),
                Err(e) => {
                    return Err(CrawlError::Unreachable {
                        url: base_key,
                        reason: e.to_string(),
                    })
                }
            }
        }

        let scheduler = Scheduler::new(
            Frontier::from_state(&state),
            config.crawler.concurrency,
            config.crawler.max_pages,
            state.counters.pages_dispatched,
        );

        let pacer = Arc::new(Pacer::new(config.delay()));
        let ctx = Arc::new(WorkerContext {
            executor: FetchExecutor::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.sleeper),
                RetryPolicy::from_config(&config),
                config.timeout(),
            ),
            pacer: Arc::clone(&pacer),
            parser: PageParser::from_config(&config)?,
            base_url: base_url.clone(),
            images: config
                .output
                .download_images
                .then(|| ImageDownloader::new(config.images_dir())),
        });

        let mut run = CrawlRun {
            state,
            scheduler,
            catalog,
            store,
            checkpoint_every: config.crawler.checkpoint_every.max(1),
            since_checkpoint: 0,
            new_products: 0,
        };

        let stop_reason = self.crawl_loop(&mut run, &ctx, &pacer).await?;
        run.checkpoint()?;

        let counters = &run.state.counters;
        let report = CrawlReport {
            base_url: base_key,
            start_path: config.site.start_path.clone(),
            started_at,
            completed_at: Utc::now(),
            elapsed_secs: clock.elapsed().as_secs_f64(),
            stop_reason,
            pages_fetched: counters.pages_fetched,
            products_found: run.catalog.len() as u64,
            new_products: run.new_products,
            listings_processed: counters.listings_processed,
            pages_dispatched_run: run.scheduler.dispatched_run(),
            pages_dispatched_total: run.scheduler.dispatched_total(),
            pending_remaining: run.state.pending.len(),
            skipped_links: counters.skipped_links,
            images_downloaded: counters.images_downloaded,
            images_failed: counters.images_failed,
            errors_total: counters.errors_total(),
            errors: counters.errors.clone(),
            failures: run.state.failures.clone(),
            files: files.clone(),
            settings: ReportSettings::from_config(&config),
        };

        let report = output::finalize(&files, report)?;
        info!(
            "Crawl {}: {} products ({} new), {} pages fetched, {} errors in {:.1}s",
            report.stop_reason.as_str(),
            report.products_found,
            report.new_products,
            report.pages_fetched,
            report.errors_total,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Dispatches and resolves tasks until there is nothing left to do
    async fn crawl_loop(
        &self,
        run: &mut CrawlRun,
        ctx: &Arc<WorkerContext>,
        pacer: &Pacer,
    ) -> Result<StopReason> {
        let mut workers: JoinSet<TaskReport> = JoinSet::new();

        loop {
            if !self.shutdown.is_triggered() {
                for task in run.scheduler.next_batch() {
                    let interrupted = tokio::select! {
                        biased;
                        _ = self.shutdown.wait() => true,
                        _ = pacer.wait() => false,
                    };
                    if interrupted {
                        run.scheduler.release(task);
                        continue;
                    }

                    debug!("Dispatching {} ({})", task.url, task.kind);
                    workers.spawn(process_task(Arc::clone(ctx), task));
                }
            }

            if workers.is_empty() {
                return Ok(run.stop_reason(self.shutdown.is_triggered()));
            }

            match workers.join_next().await {
                Some(Ok(report)) => run.resolve(report)?,
                Some(Err(e)) => error!("Worker task failed: {}", e),
                None => {}
            }
        }
    }
}

/// Mutable state of one run, owned by the coordinator loop
struct CrawlRun {
    state: CrawlState,
    scheduler: Scheduler,
    catalog: CatalogWriter,
    store: JsonStateStore,
    checkpoint_every: usize,
    since_checkpoint: usize,
    new_products: u64,
}

impl CrawlRun {
    /// Applies a worker's outcome to the frontier, counters and catalog
    fn resolve(&mut self, report: TaskReport) -> Result<()> {
        let TaskReport {
            task,
            result,
            attempts,
            fetched,
            images,
        } = report;

        let counters = &mut self.state.counters;
        if fetched {
            counters.pages_fetched += 1;
        }
        counters.images_downloaded += images.downloaded;
        counters.images_failed += images.failed;

        let children: Vec<PageTask> = match result {
            TaskResult::Listing(page) => {
                counters.listings_processed += 1;
                counters.skipped_links += page.skipped_links;

                let products = page
                    .product_urls
                    .iter()
                    .map(|url| task.child(url.clone(), PageKind::Product));
                let listings = page
                    .listing_urls()
                    .map(|url| task.child(url.clone(), PageKind::Listing));
                products.chain(listings).collect()
            }
            TaskResult::Product(record) => {
                if self.catalog.append_record(&record)? {
                    self.new_products += 1;
                    info!(
                        "Collected {} ({})",
                        record.name.as_deref().unwrap_or("unnamed product"),
                        record.product_url
                    );
                }
                counters.products_found = self.catalog.len() as u64;
                Vec::new()
            }
            TaskResult::Failed {
                kind,
                reason,
                status,
            } => {
                warn!(
                    "Giving up on {} after {} attempt(s): {} ({})",
                    task.url,
                    task.attempts,
                    reason,
                    kind.as_str()
                );
                self.state.record_failure(FailureRecord {
                    url: task.key().to_string(),
                    kind,
                    reason,
                    attempts: task.attempts,
                    status,
                });
                Vec::new()
            }
        };

        let added = self.scheduler.mark_resolved(&task, children);
        debug!(
            "Resolved {} in {} attempt(s) ({} new tasks)",
            task.url, attempts, added
        );

        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.checkpoint_every {
            self.checkpoint()?;
            let counters = &self.state.counters;
            info!(
                "Progress: {} pages fetched, {} products, {} queued, {} in flight, {} errors",
                counters.pages_fetched,
                counters.products_found,
                self.scheduler.frontier().len(),
                self.scheduler.frontier().in_flight_count(),
                counters.errors_total()
            );
        }
        Ok(())
    }

    /// Writes the current frontier and counters to the state store
    ///
    /// In-flight tasks are saved as pending and are not counted as
    /// dispatched, since a resumed run will dispatch them again.
    fn checkpoint(&mut self) -> Result<()> {
        let (pending, visited) = self.scheduler.snapshot();
        let in_flight = self.scheduler.frontier().in_flight_count() as u64;

        self.state.pending = pending;
        self.state.visited = visited;
        self.state.counters.pages_dispatched =
            self.scheduler.dispatched_total().saturating_sub(in_flight);
        self.state.counters.products_found = self.catalog.len() as u64;
        self.state.updated_at = Utc::now();

        self.store.save(&self.state)?;
        self.since_checkpoint = 0;
        Ok(())
    }

    fn stop_reason(&self, interrupted: bool) -> StopReason {
        if interrupted {
            StopReason::Interrupted
        } else if self.scheduler.frontier().is_empty() {
            StopReason::Completed
        } else if self.scheduler.budget_exhausted() {
            StopReason::MaxPages
        } else {
            // Only reachable if a worker panicked and its slot was never freed
            warn!("Stopping with work left in the frontier; it is saved for the next run");
            StopReason::Interrupted
        }
    }
}
