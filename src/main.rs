//! Catalog Crawler main entry point
//!
//! This is the command-line interface for the storefront catalog crawler.

use anyhow::Context;
use catalog_crawler::config::{read_config, validate, Config};
use catalog_crawler::crawler::Coordinator;
use catalog_crawler::output::{print_report, CrawlReport};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog Crawler: a polite storefront catalog collector
///
/// Crawls a storefront's listing and product pages and writes a
/// deduplicated, resumable product catalog (catalog.jsonl, catalog.csv)
/// plus a crawl report. Interrupted crawls resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(version)]
#[command(about = "A polite storefront catalog crawler", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root origin used to resolve relative URLs
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Seed path, enqueued as the first listing task [default: /store/]
    #[arg(long, value_name = "PATH")]
    start: Option<String>,

    /// Output directory [default: ./out]
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Worker pool width [default: 5]
    #[arg(long)]
    concurrency: Option<usize>,

    /// Minimum interval between two requests, in seconds [default: 0.5]
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,

    /// Per-fetch timeout, in seconds [default: 30]
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Maximum attempts per page on transient failure [default: 3]
    #[arg(long)]
    retries: Option<u32>,

    /// Ceiling on the total number of dispatched pages
    #[arg(long)]
    max_pages: Option<u64>,

    /// Resolved pages between two state snapshots [default: 10]
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Also fetch and store image bytes referenced by records
    #[arg(long)]
    download_images: bool,

    /// Ignore saved state and start a fresh crawl and catalog
    #[arg(long, conflicts_with = "stats")]
    force: bool,

    /// Diagnostic verbosity
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Validate the configuration and print it without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Print the report of the last crawl in the output directory and exit
    #[arg(long)]
    stats: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    #[value(name = "TRACE")]
    Trace,
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING", alias = "WARN")]
    Warning,
    #[value(name = "ERROR")]
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level);

    let config = build_config(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.force).await?;
    }

    Ok(())
}

/// Sets up the tracing subscriber
///
/// The crate logs at the chosen level, dependencies at `warn` unless the
/// chosen level is stricter. `RUST_LOG` overrides both.
fn setup_logging(level: LogLevel) {
    let dependency_level = match level {
        LogLevel::Error => "error",
        _ => "warn",
    };
    let directive = format!("{},catalog_crawler={}", dependency_level, level.directive());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Layers defaults, the optional TOML file and CLI flags, then validates
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            read_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(base_url) = &cli.base_url {
        config.site.base_url = base_url.clone();
    }
    if let Some(start) = &cli.start {
        config.site.start_path = start.clone();
    }
    if let Some(out) = &cli.out {
        config.output.dir = out.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(delay) = cli.delay {
        config.crawler.delay_secs = delay;
    }
    if let Some(timeout) = cli.timeout {
        config.crawler.timeout_secs = timeout;
    }
    if let Some(retries) = cli.retries {
        config.crawler.retries = retries;
    }
    if cli.max_pages.is_some() {
        config.crawler.max_pages = cli.max_pages;
    }
    if let Some(every) = cli.checkpoint_every {
        config.crawler.checkpoint_every = every;
    }
    if cli.download_images {
        config.output.download_images = true;
    }

    validate(&config).context("invalid configuration")?;
    Ok(config)
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Catalog Crawler Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Start path: {}", config.site.start_path);
    println!("  Product marker: {}", config.site.product_path_marker);
    println!("  Category marker: {}", config.site.category_path_marker);

    println!("\nCrawler:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Delay: {}s", config.crawler.delay_secs);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!("  Retries: {}", config.crawler.retries);
    match config.crawler.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unlimited"),
    }
    println!(
        "  Backoff: {}s base, {}s cap, {} jitter",
        config.crawler.backoff_base_secs,
        config.crawler.backoff_max_secs,
        config.crawler.backoff_jitter
    );
    println!("  Checkpoint every: {} pages", config.crawler.checkpoint_every);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Directory: {}", config.output.dir.display());
    println!("  Download images: {}", config.output.download_images);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: prints the last report
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = config.report_path();
    let report = CrawlReport::load(&path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    print_report(&report);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, force: bool) -> anyhow::Result<()> {
    if force {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if saved state exists)");
    }

    let coordinator = Coordinator::new(config, force)?;
    let shutdown = coordinator.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight pages before stopping");
            shutdown.trigger();
        }
    });

    match coordinator.run().await {
        Ok(report) => {
            println!();
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
