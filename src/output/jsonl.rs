//! Append-only JSON Lines catalog
//!
//! One `ProductRecord` per line. The writer keeps an index of every product
//! URL already in the file so that a record is written at most once, across
//! runs as well as within one.

use crate::catalog::ProductRecord;
use crate::output::OutputResult;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Only the dedup key is needed to index an existing catalog
#[derive(Deserialize)]
struct IndexedLine {
    product_url: String,
}

#[derive(Debug)]
pub struct CatalogWriter {
    file: File,
    urls: HashSet<String>,
}

impl CatalogWriter {
    /// Opens the catalog for appending
    ///
    /// With `truncate`, any existing content is discarded. Otherwise the
    /// existing URLs are indexed and a torn trailing line (left by a crash
    /// mid-write) is cut off.
    pub fn open(path: &Path, truncate: bool) -> OutputResult<Self> {
        let urls = if truncate {
            File::create(path)?;
            HashSet::new()
        } else {
            repair_torn_tail(path)?;
            index_urls(path)?
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(
            "Opened catalog {} with {} existing records",
            path.display(),
            urls.len()
        );

        Ok(Self { file, urls })
    }

    /// Appends one record as a JSON line
    ///
    /// Returns false, writing nothing, if the product URL is already in the
    /// catalog.
    pub fn append_record(&mut self, record: &ProductRecord) -> OutputResult<bool> {
        if self.urls.contains(&record.product_url) {
            debug!("Catalog already holds {}", record.product_url);
            return Ok(false);
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;

        self.urls.insert(record.product_url.clone());
        Ok(true)
    }

    /// Records in the catalog, from this run and earlier ones
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Reads every record of a catalog file
///
/// Lines that do not parse are skipped with a warning. A missing file is
/// an empty catalog.
pub fn read_catalog(path: &Path) -> OutputResult<Vec<ProductRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ProductRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                "Skipping unreadable record on line {} of {}: {}",
                index + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(records)
}

fn index_urls(path: &Path) -> OutputResult<HashSet<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    let mut urls = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IndexedLine>(&line) {
            Ok(indexed) => {
                urls.insert(indexed.product_url);
            }
            Err(e) => warn!("Ignoring unreadable catalog line in {}: {}", path.display(), e),
        }
    }
    Ok(urls)
}

/// Truncates the file after its last newline, if the final line is incomplete
fn repair_torn_tail(path: &Path) -> OutputResult<()> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(());
    }

    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        "Catalog {} ends with an incomplete record; dropping {} trailing bytes",
        path.display(),
        bytes.len() - keep
    );
    OpenOptions::new()
        .write(true)
        .open(path)?
        .set_len(keep as u64)?;
    Ok(())
}
