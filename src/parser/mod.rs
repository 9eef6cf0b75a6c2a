//! HTML parsers for storefront pages
//!
//! - `ListingParser`: product links, category links and pagination
//! - `ProductParser`: one `ProductRecord` per product page
//!
//! `PageParser` routes a fetched body to the right parser by page kind.
//! All parsing is synchronous: the parsed DOM never lives across an
//! `.await`.

mod extract;
mod listing;
mod product;

pub use listing::{ListingPage, ListingParser};
pub use product::ProductParser;

use crate::catalog::ProductRecord;
use crate::config::Config;
use crate::state::PageKind;
use thiserror::Error;
use url::Url;

/// Errors that resolve a fetched page as a parse failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no name, SKU or price could be recovered from {url}")]
    Degraded { url: String },
}

/// What a fetched page turned out to contain
#[derive(Debug, Clone)]
pub enum ParsedPage {
    Listing(ListingPage),
    Product(Box<ProductRecord>),
}

/// Routes page bodies to the listing or product parser
#[derive(Debug, Clone)]
pub struct PageParser {
    listing: ListingParser,
    product: ProductParser,
}

impl PageParser {
    pub fn new(base_url: Url, product_marker: &str, category_marker: &str) -> Self {
        Self {
            listing: ListingParser::new(base_url, product_marker, category_marker),
            product: ProductParser::new(category_marker),
        }
    }

    /// Builds the parsers for the configured storefront
    pub fn from_config(config: &Config) -> Result<Self, url::ParseError> {
        Ok(Self::new(
            config.base_url()?,
            &config.site.product_path_marker,
            &config.site.category_path_marker,
        ))
    }

    /// Parses a body fetched for a task of the given kind
    ///
    /// `page_url` is the page's identity; `served_url` is where the body
    /// actually came from and is the base for relative links. A listing
    /// task whose body is actually a single product page is parsed as a
    /// product.
    pub fn parse(
        &self,
        kind: PageKind,
        body: &str,
        page_url: &Url,
        served_url: &Url,
    ) -> Result<ParsedPage, ParseError> {
        match kind {
            PageKind::Listing if !self.listing.is_product_page(body) => {
                Ok(ParsedPage::Listing(self.listing.parse(body, served_url)))
            }
            _ => self
                .product
                .parse_served(body, page_url, served_url)
                .map(|record| ParsedPage::Product(Box::new(record))),
        }
    }
}
