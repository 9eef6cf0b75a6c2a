//! Product image downloader
//!
//! Stores image bytes under `<images dir>/<product slug>/<nn>-<file name>`.
//! Image failures are counted and logged but never fail the product.

use crate::catalog::ProductRecord;
use crate::crawler::{FetchExecutor, FetchOutcome, Pacer};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Per-product download tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub downloaded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
pub struct ImageDownloader {
    dir: PathBuf,
}

impl ImageDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Downloads the main and gallery images of a record
    ///
    /// Each download takes its own pacer slot.
    pub async fn download_all(
        &self,
        record: &ProductRecord,
        executor: &FetchExecutor,
        pacer: &Pacer,
    ) -> ImageStats {
        let mut stats = ImageStats::default();
        let slug = if record.slug.is_empty() {
            "product"
        } else {
            record.slug.as_str()
        };
        let product_dir = self.dir.join(slug);

        for (index, raw) in record.image_urls().into_iter().enumerate() {
            let url = match Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping image '{}' of {}: {}", raw, record.product_url, e);
                    stats.failed += 1;
                    continue;
                }
            };

            pacer.wait().await;
            let fetched = executor.fetch_with_retry(&url, pacer).await;
            let FetchOutcome::Success { body, .. } = fetched.outcome else {
                warn!(
                    "Failed to download image {} of {} after {} attempt(s)",
                    url, record.product_url, fetched.attempts
                );
                stats.failed += 1;
                continue;
            };

            let target = product_dir.join(image_file_name(index + 1, &url));
            let written = async {
                tokio::fs::create_dir_all(&product_dir).await?;
                tokio::fs::write(&target, &body).await
            }
            .await;

            match written {
                Ok(()) => {
                    debug!("Saved image {} to {}", url, target.display());
                    stats.downloaded += 1;
                }
                Err(e) => {
                    warn!("Failed to store image {} at {}: {}", url, target.display(), e);
                    stats.failed += 1;
                }
            }
        }

        stats
    }
}

/// File name for the `index`-th image of a product
///
/// `<nn>-<last path segment>`, restricted to `[A-Za-z0-9._-]`.
pub fn image_file_name(index: usize, url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    let mut name: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.trim_matches(|c| c == '.' || c == '_').is_empty() {
        name = "image".to_string();
    }
    format!("{:02}-{}", index, name)
}
