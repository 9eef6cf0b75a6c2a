//! URL handling module
//!
//! This module provides URL normalization (the canonical form used for
//! deduplication), link resolution, same-site checks and slug extraction.

mod normalize;

pub use normalize::{normalize_url, resolve_link};

use url::Url;

/// Returns true if both URLs point at the same site (host and port)
///
/// The scheme is ignored so that a storefront linking to itself over plain
/// http is still treated as internal.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_crawler::url::same_site;
///
/// let base = Url::parse("https://shop.example.com/").unwrap();
/// assert!(same_site(&base, &Url::parse("http://shop.example.com/product/a").unwrap()));
/// assert!(!same_site(&base, &Url::parse("https://cdn.example.com/a.jpg").unwrap()));
/// ```
pub fn same_site(a: &Url, b: &Url) -> bool {
    let host_a = a.host_str().map(str::to_lowercase);
    let host_b = b.host_str().map(str::to_lowercase);
    host_a.is_some() && host_a == host_b && effective_port(a) == effective_port(b)
}

fn effective_port(url: &Url) -> Option<u16> {
    match (url.port(), url.scheme()) {
        (Some(port), _) => Some(port),
        // http and https defaults are interchangeable for the same-site check
        (None, "http") | (None, "https") => None,
        (None, _) => url.port_or_known_default(),
    }
}

/// Extracts the last non-empty path segment of a URL
///
/// Returns an empty string for the site root.
pub fn slug_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .unwrap_or_default()
}
