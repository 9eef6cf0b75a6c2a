//! Listing page parser
//!
//! Extracts product links, category links and pagination from a
//! category/index page. Individual bad anchors never fail the page: links
//! that cannot be resolved are counted in `skipped_links`, links to other
//! sites are ignored.

use crate::parser::extract::{has_class, select_all, select_first};
use crate::url::{resolve_link, same_site};
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use tracing::{debug, trace, warn};
use url::Url;

/// Product link selectors for the common storefront themes, most specific first
const PRODUCT_LINK_SELECTORS: &[&str] = &[
    "a.woocommerce-LoopProduct-link",
    ".product a.woocommerce-loop-product__link",
    ".products .product a[href]",
    ".product-item a[href]",
    "li.product a[href]",
    ".wc-block-grid__product a[href]",
    "a[href]",
];

const CATEGORY_LINK_SELECTORS: &[&str] = &[
    ".product-categories a",
    ".widget_product_categories a",
    ".wc-block-product-categories a",
    "nav.woocommerce-breadcrumb a",
    ".cat-item a",
    "a[href]",
];

const PAGINATION_SELECTORS: &[&str] = &[
    ".woocommerce-pagination a",
    ".page-numbers a",
    "a.page-numbers",
    "nav.pagination a",
    ".pagination a",
    "a[rel~=next]",
];

/// Markers of a single product page
const PRODUCT_PAGE_INDICATORS: &[&str] = &[
    ".single-product",
    ".product_title",
    ".woocommerce-product-gallery",
    "form.cart",
    ".single_add_to_cart_button",
];

/// Links discovered on one listing page, deduplicated, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub product_urls: Vec<Url>,
    pub category_urls: Vec<Url>,
    pub pagination_urls: Vec<Url>,
    pub next_page: Option<Url>,

    /// Anchors whose href could not be resolved to a crawlable URL
    pub skipped_links: u64,
}

impl ListingPage {
    /// All discovered listing URLs (categories, then pagination)
    pub fn listing_urls(&self) -> impl Iterator<Item = &Url> {
        self.category_urls.iter().chain(self.pagination_urls.iter())
    }
}

/// Parser for storefront listing pages
#[derive(Debug, Clone)]
pub struct ListingParser {
    base_url: Url,
    product_marker: String,
    category_marker: String,
}

/// Ordered set of discovered URLs
#[derive(Default)]
struct LinkSet {
    urls: Vec<Url>,
    seen: HashSet<String>,
}

impl LinkSet {
    fn insert(&mut self, url: Url) {
        if self.seen.insert(url.as_str().to_string()) {
            self.urls.push(url);
        }
    }
}

impl ListingParser {
    pub fn new(
        base_url: Url,
        product_marker: impl Into<String>,
        category_marker: impl Into<String>,
    ) -> Self {
        Self {
            base_url,
            product_marker: product_marker.into(),
            category_marker: category_marker.into(),
        }
    }

    /// Parses a listing page body served from `page_url`
    ///
    /// `page_url` must be the URL the body was actually served from, not its
    /// normalized key: `page/2/` on `/store/` is `/store/page/2/`.
    pub fn parse(&self, html: &str, page_url: &Url) -> ListingPage {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut skipped_hrefs: HashSet<String> = HashSet::new();
        let mut seen_hrefs: HashSet<String> = HashSet::new();

        let product_urls = self.collect_links(
            root,
            PRODUCT_LINK_SELECTORS,
            page_url,
            |href| href.contains(&self.product_marker),
            &mut seen_hrefs,
            &mut skipped_hrefs,
        );

        seen_hrefs.clear();
        let category_urls = self.collect_links(
            root,
            CATEGORY_LINK_SELECTORS,
            page_url,
            |href| href.contains(&self.category_marker),
            &mut seen_hrefs,
            &mut skipped_hrefs,
        );

        seen_hrefs.clear();
        let (pagination_urls, next_page) =
            self.collect_pagination(root, page_url, &mut seen_hrefs, &mut skipped_hrefs);

        let page = ListingPage {
            product_urls: product_urls.into_iter().map(without_query).collect(),
            category_urls: category_urls.into_iter().map(without_query).collect(),
            pagination_urls,
            next_page,
            skipped_links: skipped_hrefs.len() as u64,
        };

        debug!(
            "Listing {}: {} products, {} categories, {} pagination links, {} skipped",
            page_url,
            page.product_urls.len(),
            page.category_urls.len(),
            page.pagination_urls.len(),
            page.skipped_links
        );
        page
    }

    /// Returns true if the body is a single product page
    ///
    /// Some storefronts redirect a one-item category straight to the
    /// product, so listing tasks are checked before link extraction.
    pub fn is_product_page(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        select_first(document.root_element(), PRODUCT_PAGE_INDICATORS).is_some()
    }

    fn collect_links<F>(
        &self,
        root: ElementRef<'_>,
        selectors: &[&str],
        page_url: &Url,
        wanted: F,
        seen_hrefs: &mut HashSet<String>,
        skipped_hrefs: &mut HashSet<String>,
    ) -> Vec<Url>
    where
        F: Fn(&str) -> bool,
    {
        let mut links = LinkSet::default();

        for css in selectors {
            for anchor in select_all(root, css) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                if !wanted(href) || !seen_hrefs.insert(href.to_string()) {
                    continue;
                }
                if let Some(url) = self.resolve(href, page_url, skipped_hrefs) {
                    links.insert(url);
                }
            }
        }

        links.urls
    }

    fn collect_pagination(
        &self,
        root: ElementRef<'_>,
        page_url: &Url,
        seen_hrefs: &mut HashSet<String>,
        skipped_hrefs: &mut HashSet<String>,
    ) -> (Vec<Url>, Option<Url>) {
        let mut links = LinkSet::default();
        let mut next_page = None;

        for css in PAGINATION_SELECTORS {
            for anchor in select_all(root, css) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let is_next = has_class(anchor, "next")
                    || anchor
                        .value()
                        .attr("rel")
                        .map_or(false, |rel| rel.split_whitespace().any(|r| r == "next"));

                if !seen_hrefs.insert(href.to_string()) && !is_next {
                    continue;
                }
                let Some(url) = self.resolve(href, page_url, skipped_hrefs) else {
                    continue;
                };
                if is_next {
                    next_page = Some(url.clone());
                }
                links.insert(url);
            }
        }

        // <link rel="next"> in the document head
        if next_page.is_none() {
            if let Some(link) = select_first(root, &["link[rel~=next][href]"]) {
                if let Some(href) = link.value().attr("href") {
                    if let Some(url) = self.resolve(href, page_url, skipped_hrefs) {
                        links.insert(url.clone());
                        next_page = Some(url);
                    }
                }
            }
        }

        (links.urls, next_page)
    }

    /// Resolves and normalizes a href, keeping only same-site links
    fn resolve(&self, href: &str, page_url: &Url, skipped: &mut HashSet<String>) -> Option<Url> {
        match resolve_link(href, page_url) {
            Ok(url) if same_site(&url, &self.base_url) => Some(url),
            Ok(url) => {
                trace!("Ignoring off-site link {}", url);
                None
            }
            Err(e) => {
                if skipped.insert(href.to_string()) {
                    warn!("Skipping malformed link '{}' on {}: {}", href, page_url, e);
                }
                None
            }
        }
    }
}

/// Product and category pages are keyed without their query string
fn without_query(mut url: Url) -> Url {
    url.set_query(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    const LISTING_HTML: &str = include_str!("../../tests/fixtures/listing_page.html");
    const PRODUCT_HTML: &str = include_str!("../../tests/fixtures/product_page.html");

    fn parser() -> ListingParser {
        ListingParser::new(
            Url::parse("https://shop.example.com/").unwrap(),
            "/product/",
            "/product-category/",
        )
    }

    fn page_url() -> Url {
        Url::parse("https://shop.example.com/store/page/2/").unwrap()
    }

    fn strings(urls: &[Url]) -> Vec<&str> {
        urls.iter().map(Url::as_str).collect()
    }

    #[test]
    fn test_extract_product_urls() {
        let page = parser().parse(LISTING_HTML, &page_url());
        assert_eq!(
            strings(&page.product_urls),
            vec![
                "https://shop.example.com/product/honeycomb",
                "https://shop.example.com/product/sicilian-pistachio",
                "https://shop.example.com/product/mint-chip",
            ]
        );
    }

    #[test]
    fn test_extract_category_urls() {
        let page = parser().parse(LISTING_HTML, &page_url());
        assert_eq!(page.category_urls.len(), 3);
        let urls = strings(&page.category_urls);
        assert!(urls.contains(&"https://shop.example.com/product-category/pints"));
        assert!(urls.contains(&"https://shop.example.com/product-category/vegan"));
        assert!(urls.contains(&"https://shop.example.com/product-category/classics"));
    }

    #[test]
    fn test_extract_pagination() {
        let page = parser().parse(LISTING_HTML, &page_url());
        assert_eq!(
            strings(&page.pagination_urls),
            vec![
                "https://shop.example.com/store/page/1",
                "https://shop.example.com/store/page/3",
            ]
        );
        assert_eq!(
            page.next_page.as_ref().map(Url::as_str),
            Some("https://shop.example.com/store/page/3")
        );
    }

    #[test]
    fn test_malformed_links_counted_offsite_ignored() {
        let page = parser().parse(LISTING_HTML, &page_url());
        assert_eq!(page.skipped_links, 1);
        assert!(!page
            .product_urls
            .iter()
            .any(|u| u.host_str() == Some("partner-shop.example.net")));
    }

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_malformed_links_logged_at_warn() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let page = tracing::subscriber::with_default(subscriber, || {
            parser().parse(LISTING_HTML, &page_url())
        });
        assert_eq!(page.skipped_links, 1);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|line| line.contains("Skipping malformed link"))
            .expect("malformed link not logged at warn");
        assert!(line.contains("WARN"));
    }

    #[test]
    fn test_relative_links_resolve_against_served_directory() {
        let html = r#"<html><body>
            <ul class="products"><li class="product"><a href="../product/mint/">Mint</a></li></ul>
            <nav class="woocommerce-pagination"><a class="next page-numbers" href="page/2/">2</a></nav>
        </body></html>"#;

        let served = Url::parse("https://shop.example.com/store/").unwrap();
        let page = parser().parse(html, &served);
        assert_eq!(
            page.next_page.as_ref().map(Url::as_str),
            Some("https://shop.example.com/store/page/2")
        );
        assert_eq!(
            strings(&page.product_urls),
            vec!["https://shop.example.com/product/mint"]
        );

        // Without its trailing slash the same page is a different base
        let keyed = Url::parse("https://shop.example.com/store").unwrap();
        assert_eq!(
            parser().parse(html, &keyed).next_page.as_ref().map(Url::as_str),
            Some("https://shop.example.com/page/2")
        );
    }

    #[test]
    fn test_missing_pagination_is_last_page() {
        let html = r#"<html><body><ul class="products">
            <li class="product"><a href="/product/a/">A</a></li>
        </ul></body></html>"#;
        let page = parser().parse(html, &page_url());
        assert_eq!(page.product_urls.len(), 1);
        assert!(page.pagination_urls.is_empty());
        assert!(page.next_page.is_none());
        assert_eq!(page.skipped_links, 0);
    }

    #[test]
    fn test_empty_body_yields_nothing() {
        let page = parser().parse("", &page_url());
        assert_eq!(page, ListingPage::default());
    }

    #[test]
    fn test_link_rel_next_fallback() {
        let html = r#"<html><head><link rel="next" href="/store/page/3/"></head><body></body></html>"#;
        let page = parser().parse(html, &page_url());
        assert_eq!(
            page.next_page.as_ref().map(Url::as_str),
            Some("https://shop.example.com/store/page/3")
        );
        assert_eq!(page.pagination_urls.len(), 1);
    }

    #[test]
    fn test_custom_product_marker() {
        let parser = ListingParser::new(
            Url::parse("https://shop.example.com/").unwrap(),
            "/p/",
            "/c/",
        );
        let html = r#"<a href="/p/widget">Widget</a><a href="/product/ignored">X</a>"#;
        let page = parser.parse(html, &page_url());
        assert_eq!(
            strings(&page.product_urls),
            vec!["https://shop.example.com/p/widget"]
        );
    }

    #[test]
    fn test_is_product_page() {
        assert!(!parser().is_product_page(LISTING_HTML));
        assert!(parser().is_product_page(PRODUCT_HTML));
    }
}
