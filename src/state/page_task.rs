/// Page task definitions: the unit of work flowing through the crawl
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which parser a fetched page is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Category/index page: yields product links and further listings
    Listing,

    /// Product page: yields one `ProductRecord`
    Product,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Product => "product",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of crawl work
///
/// `url` is always in normalized form; it is the dedup key across the
/// frontier, the visited set and the output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTask {
    pub url: Url,
    pub kind: PageKind,
    pub depth: u32,
    #[serde(default)]
    pub attempts: u32,
}

impl PageTask {
    pub fn new(url: Url, kind: PageKind, depth: u32) -> Self {
        Self {
            url,
            kind,
            depth,
            attempts: 0,
        }
    }

    pub fn listing(url: Url, depth: u32) -> Self {
        Self::new(url, PageKind::Listing, depth)
    }

    pub fn product(url: Url, depth: u32) -> Self {
        Self::new(url, PageKind::Product, depth)
    }

    /// The dedup key of this task
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    /// Builds a child task discovered on this page
    pub fn child(&self, url: Url, kind: PageKind) -> Self {
        Self::new(url, kind, self.depth + 1)
    }
}

/// Why a task was terminally resolved as a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 4xx other than 429, or any other non-retryable response
    Permanent,

    /// Transient failures until the attempt budget ran out
    RetriesExhausted,

    /// Fetched fine but too degraded to extract name, SKU or price
    ParseFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::RetriesExhausted => "retries_exhausted",
            Self::ParseFailure => "parse_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_increments_depth() {
        let parent = PageTask::listing(Url::parse("https://example.com/store").unwrap(), 0);
        let child = parent.child(
            Url::parse("https://example.com/product/a").unwrap(),
            PageKind::Product,
        );
        assert_eq!(child.depth, 1);
        assert_eq!(child.kind, PageKind::Product);
        assert_eq!(child.attempts, 0);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&FailureKind::RetriesExhausted).unwrap(),
            "\"retries_exhausted\""
        );
        assert_eq!(serde_json::to_string(&PageKind::Listing).unwrap(), "\"listing\"");
        assert_eq!(FailureKind::ParseFailure.to_string(), "parse_failure");
    }

    #[test]
    fn test_task_deserializes_without_attempts() {
        let task: PageTask = serde_json::from_str(
            r#"{"url":"https://example.com/product/a","kind":"product","depth":2}"#,
        )
        .unwrap();
        assert_eq!(task.attempts, 0);
        assert_eq!(task.key(), "https://example.com/product/a");
    }
}
