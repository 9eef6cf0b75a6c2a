//! Product records extracted from product pages
//!
//! A `ProductRecord` is built once per successfully parsed product page and
//! is never modified afterwards. Every extracted field is optional or may be
//! empty: a missing value on the page becomes `None`/empty here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of an image `srcset` attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcsetEntry {
    pub url: String,

    /// Width in pixels for `NNNw` descriptors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Raw descriptor for anything else (`2x`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

/// A product image with its responsive variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub srcset: Vec<SrcsetEntry>,
}

impl ProductImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt: None,
            width: None,
            height: None,
            srcset: Vec::new(),
        }
    }
}

/// A category the product is filed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Key/value pair from the "additional information" section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePair {
    pub key: String,
    pub value: String,
}

/// One row of a nutrition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionRow {
    pub label: String,
    pub value: String,
}

/// Complete product record, one line of `catalog.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    // Identity
    pub product_url: String,
    pub slug: String,
    pub name: Option<String>,
    pub sku: Option<String>,

    // Pricing
    pub price_text: Option<String>,
    pub currency_symbol: Option<String>,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,

    // Availability
    pub stock_text: Option<String>,
    pub in_stock: Option<bool>,

    // Descriptions
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    #[serde(default)]
    pub additional_information: Vec<AttributePair>,

    // Categorization
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub tags: Vec<String>,

    // Images
    pub main_image: Option<ProductImage>,
    #[serde(default)]
    pub gallery_images: Vec<ProductImage>,

    // Ingredients, allergens, nutrition
    pub ingredients: Option<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub nutrition_info: Vec<NutritionRow>,
    #[serde(default)]
    pub nutrition_pdf_url: Option<String>,

    pub timestamp_collected: DateTime<Utc>,
}

impl ProductRecord {
    /// Returns true if the record is on sale (a sale price was recovered)
    pub fn is_on_sale(&self) -> bool {
        self.sale_price.is_some()
    }

    /// All image URLs referenced by the record, main image first, deduplicated
    pub fn image_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        let candidates = self.main_image.iter().chain(self.gallery_images.iter());
        for image in candidates {
            if !urls.contains(&image.url.as_str()) {
                urls.push(&image.url);
            }
        }
        urls
    }
}
