use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Main configuration structure for the catalog crawler
///
/// Every section has defaults, so an empty TOML file (or no file at all)
/// yields a usable configuration once `site.base-url` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Target storefront configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Root origin used to resolve the seed path
    pub base_url: String,

    /// Seed path, enqueued as the first listing task
    pub start_path: String,

    /// Path fragment that identifies product links on listing pages
    pub product_path_marker: String,

    /// Path fragment that identifies category listing links
    pub category_path_marker: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.com".to_string(),
            start_path: "/store/".to_string(),
            product_path_marker: "/product/".to_string(),
            category_path_marker: "/product-category/".to_string(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Worker pool width
    pub concurrency: usize,

    /// Minimum interval between two dispatches, across all workers (seconds)
    pub delay_secs: f64,

    /// Per-fetch timeout (seconds)
    pub timeout_secs: f64,

    /// Maximum attempts per task on transient failure
    pub retries: u32,

    /// Ceiling on dispatched tasks for a run
    pub max_pages: Option<u64>,

    /// Base delay of the exponential backoff (seconds)
    pub backoff_base_secs: f64,

    /// Upper bound of a single backoff delay (seconds)
    pub backoff_max_secs: f64,

    /// Jitter fraction applied on top of each backoff delay
    pub backoff_jitter: f64,

    /// Number of resolved tasks between two state snapshots
    pub checkpoint_every: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            delay_secs: 0.5,
            timeout_secs: 30.0,
            retries: 3,
            max_pages: None,
            backoff_base_secs: 1.0,
            backoff_max_secs: 30.0,
            backoff_jitter: 0.2,
            checkpoint_every: 10,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving the catalog, report and state files
    pub dir: PathBuf,

    /// Also fetch and store the image bytes referenced by records
    pub download_images: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./out"),
            download_images: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "CatalogCrawler".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/example/catalog-crawler".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the identifying header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Non-negative seconds as a `Duration`, saturating instead of panicking on
/// values `Duration` cannot hold. NaN maps to zero.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

impl Config {
    /// Parsed base URL. Only valid after `validate` has accepted the config.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.site.base_url)
    }

    /// The seed URL: the start path resolved against the base URL
    pub fn start_url(&self) -> Result<Url, url::ParseError> {
        self.base_url()?.join(&self.site.start_path)
    }

    pub fn delay(&self) -> Duration {
        secs_to_duration(self.crawler.delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        secs_to_duration(self.crawler.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        secs_to_duration(self.crawler.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        secs_to_duration(self.crawler.backoff_max_secs)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.output.dir.join("catalog.jsonl")
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output.dir.join("catalog.csv")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.dir.join("report.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.output.dir.join(".crawl_state.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output.dir.join("images")
    }
}
