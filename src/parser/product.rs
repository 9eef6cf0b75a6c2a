//! Product page parser
//!
//! Each record field is produced by an ordered chain of independent
//! extractors: the first extractor returning a value wins, and a field with
//! no hit stays empty. A miss in one field never affects the others.

use crate::catalog::{
    AttributePair, CategoryRef, NutritionRow, ProductImage, ProductRecord, SrcsetEntry,
};
use crate::parser::extract::{
    attr, attr_u32, block_text, first_text, has_class, json_ld_offer, json_ld_product, json_text,
    non_empty, resolve_asset, select_all, select_first, split_currency, text_of,
};
use crate::parser::ParseError;
use crate::url::{resolve_link, slug_from_url};
use chrono::Utc;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::collections::HashSet;
use tracing::trace;
use url::Url;

/// Everything an extractor may look at
struct PageContext<'a> {
    root: ElementRef<'a>,
    /// Base for relative links and assets: the URL the body was served from
    document_url: &'a Url,
    json_ld: Option<Value>,
    category_marker: &'a str,
}

type Extractor<T> = fn(&PageContext<'_>) -> Option<T>;

/// Runs extractors in order and keeps the first hit
fn first_hit<T>(ctx: &PageContext<'_>, field: &str, chain: &[Extractor<T>]) -> Option<T> {
    let hit = chain.iter().find_map(|extract| extract(ctx));
    if hit.is_none() {
        trace!("No value for '{}' on {}", field, ctx.document_url);
    }
    hit
}

/// Price fields recovered from one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PriceInfo {
    price_text: Option<String>,
    currency_symbol: Option<String>,
    regular_price: Option<String>,
    sale_price: Option<String>,
}

impl PriceInfo {
    fn is_empty(&self) -> bool {
        self.price_text.is_none() && self.regular_price.is_none() && self.sale_price.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StockInfo {
    text: Option<String>,
    in_stock: Option<bool>,
}

#[derive(Debug, Default)]
struct ImageSet {
    main: Option<ProductImage>,
    gallery: Vec<ProductImage>,
}

/// Parser for single product pages
#[derive(Debug, Clone)]
pub struct ProductParser {
    category_marker: String,
}

impl ProductParser {
    pub fn new(category_marker: impl Into<String>) -> Self {
        Self {
            category_marker: category_marker.into(),
        }
    }

    /// Parses a product page body served from its own canonical URL
    pub fn parse(&self, html: &str, product_url: &Url) -> Result<ProductRecord, ParseError> {
        self.parse_served(html, product_url, product_url)
    }

    /// Parses a product page body served from `document_url`
    ///
    /// `product_url` is the record's identity (URL and slug); relative
    /// image and link targets resolve against `document_url`. Fails only
    /// when the page is too degraded to yield a name, a SKU or any price.
    pub fn parse_served(
        &self,
        html: &str,
        product_url: &Url,
        document_url: &Url,
    ) -> Result<ProductRecord, ParseError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let ctx = PageContext {
            root,
            document_url,
            json_ld: json_ld_product(root),
            category_marker: &self.category_marker,
        };

        let name = first_hit(
            &ctx,
            "name",
            &[name_from_title, name_from_json_ld, name_from_og_title, name_from_any_h1],
        );
        let sku = first_hit(&ctx, "sku", &[sku_from_element, sku_from_meta, sku_from_json_ld]);
        let price = first_hit(
            &ctx,
            "price",
            &[price_from_container, price_from_meta, price_from_json_ld],
        )
        .unwrap_or_default();

        if name.is_none() && sku.is_none() && price.is_empty() {
            return Err(ParseError::Degraded {
                url: product_url.to_string(),
            });
        }

        let stock = first_hit(
            &ctx,
            "stock",
            &[
                stock_from_element,
                stock_from_badge,
                stock_from_json_ld,
                stock_from_cart_button,
            ],
        )
        .unwrap_or(StockInfo {
            text: None,
            in_stock: None,
        });

        let additional_information = extract_additional_info(&ctx);
        let images = extract_images(&ctx);
        let ingredients = first_hit(
            &ctx,
            "ingredients",
            &[ingredients_from_section, ingredients_from_paragraph],
        )
        .or_else(|| attribute_value(&additional_information, "ingredient"));
        let allergen_text = first_hit(
            &ctx,
            "allergens",
            &[allergens_from_section, allergens_from_paragraph],
        )
        .or_else(|| attribute_value(&additional_information, "allergen"));

        Ok(ProductRecord {
            product_url: product_url.to_string(),
            slug: slug_from_url(product_url),
            name,
            sku,
            price_text: price.price_text,
            currency_symbol: price.currency_symbol,
            regular_price: price.regular_price,
            sale_price: price.sale_price,
            stock_text: stock.text,
            in_stock: stock.in_stock,
            short_description: first_hit(&ctx, "short_description", &[short_description]),
            long_description: first_hit(
                &ctx,
                "long_description",
                &[long_description_from_tab, long_description_from_json_ld],
            ),
            additional_information,
            categories: extract_categories(&ctx),
            tags: extract_tags(&ctx),
            main_image: images.main,
            gallery_images: images.gallery,
            ingredients,
            allergens: allergen_text.map(|t| split_allergens(&t)).unwrap_or_default(),
            nutrition_info: extract_nutrition(&ctx),
            nutrition_pdf_url: extract_nutrition_pdf(&ctx),
            timestamp_collected: Utc::now(),
        })
    }
}

// ===== Name =====

fn name_from_title(ctx: &PageContext<'_>) -> Option<String> {
    first_text(
        ctx.root,
        &[
            ".product_title",
            "h1.entry-title",
            ".single-product h1",
            "h1[itemprop=name]",
            ".product-title h1",
        ],
    )
}

fn name_from_json_ld(ctx: &PageContext<'_>) -> Option<String> {
    json_text(ctx.json_ld.as_ref()?.get("name"))
}

fn name_from_og_title(ctx: &PageContext<'_>) -> Option<String> {
    select_first(ctx.root, &[r#"meta[property="og:title"]"#]).and_then(|m| attr(m, "content"))
}

fn name_from_any_h1(ctx: &PageContext<'_>) -> Option<String> {
    first_text(ctx.root, &["h1"])
}

// ===== SKU =====

fn sku_from_element(ctx: &PageContext<'_>) -> Option<String> {
    first_text(ctx.root, &[".sku", "[itemprop=sku]:not(meta)"])
        .filter(|sku| !sku.eq_ignore_ascii_case("n/a"))
}

fn sku_from_meta(ctx: &PageContext<'_>) -> Option<String> {
    select_first(ctx.root, &["meta[itemprop=sku]"]).and_then(|m| attr(m, "content"))
}

fn sku_from_json_ld(ctx: &PageContext<'_>) -> Option<String> {
    json_text(ctx.json_ld.as_ref()?.get("sku"))
}

// ===== Price =====

fn price_from_container(ctx: &PageContext<'_>) -> Option<PriceInfo> {
    let container = [".summary .price", ".price", "[itemprop=price]:not(meta)"]
        .iter()
        .flat_map(|css| select_all(ctx.root, css))
        .find(|el| !text_of(*el).is_empty())?;

    let price_text = non_empty(text_of(container));
    let symbol_element = select_first(container, &[".woocommerce-Price-currencySymbol"])
        .map(text_of)
        .and_then(non_empty);

    let regular_el = select_first(container, &["del .amount"]);
    let sale_el = select_first(container, &["ins .amount"]);

    let (regular_text, sale_text) = match (regular_el, sale_el) {
        (Some(regular), Some(sale)) => (Some(text_of(regular)), Some(text_of(sale))),
        _ => {
            let amount = select_first(container, &[".amount"])
                .map(text_of)
                .or_else(|| price_text.clone());
            (amount, None)
        }
    };

    let (regular_symbol, regular_price) = regular_text
        .as_deref()
        .map(split_currency)
        .unwrap_or((None, None));
    let sale_price = sale_text.as_deref().and_then(|t| split_currency(t).1);

    Some(PriceInfo {
        price_text,
        currency_symbol: symbol_element.or(regular_symbol),
        regular_price,
        sale_price,
    })
}

fn price_from_meta(ctx: &PageContext<'_>) -> Option<PriceInfo> {
    let amount = select_first(ctx.root, &["meta[itemprop=price]"]).and_then(|m| attr(m, "content"))?;
    let currency = select_first(ctx.root, &["meta[itemprop=priceCurrency]"])
        .and_then(|m| attr(m, "content"));
    Some(PriceInfo {
        price_text: None,
        currency_symbol: currency,
        regular_price: split_currency(&amount).1,
        sale_price: None,
    })
}

fn price_from_json_ld(ctx: &PageContext<'_>) -> Option<PriceInfo> {
    let offer = json_ld_offer(ctx.json_ld.as_ref()?)?;
    let amount = json_text(offer.get("price"))
        .or_else(|| json_text(offer.get("lowPrice")))?;
    Some(PriceInfo {
        price_text: None,
        currency_symbol: json_text(offer.get("priceCurrency")),
        regular_price: split_currency(&amount).1,
        sale_price: None,
    })
}

// ===== Stock =====

const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "out of stock",
    "out-of-stock",
    "sold out",
    "unavailable",
    "not available",
];

fn stock_from_element(ctx: &PageContext<'_>) -> Option<StockInfo> {
    let element = select_first(ctx.root, &[".summary .stock", ".stock"])?;
    let text = non_empty(text_of(element));
    let lowered = text.as_deref().unwrap_or("").to_lowercase();

    let out = has_class(element, "out-of-stock")
        || OUT_OF_STOCK_PHRASES.iter().any(|p| lowered.contains(p));
    Some(StockInfo {
        text,
        in_stock: Some(!out),
    })
}

fn stock_from_badge(ctx: &PageContext<'_>) -> Option<StockInfo> {
    select_first(
        ctx.root,
        &[
            ".summary .out-of-stock",
            ".summary .sold-out",
            ".out-of-stock",
            ".sold-out",
        ],
    )?;
    Some(StockInfo {
        text: Some("Out of stock".to_string()),
        in_stock: Some(false),
    })
}

fn stock_from_json_ld(ctx: &PageContext<'_>) -> Option<StockInfo> {
    let offer = json_ld_offer(ctx.json_ld.as_ref()?)?;
    let availability = json_text(offer.get("availability"))?;
    let kind = availability.rsplit('/').next().unwrap_or(&availability);
    let in_stock = match kind {
        "InStock" | "LimitedAvailability" | "OnlineOnly" | "InStoreOnly" | "PreOrder"
        | "BackOrder" => true,
        "OutOfStock" | "SoldOut" | "Discontinued" => false,
        _ => return None,
    };
    Some(StockInfo {
        text: None,
        in_stock: Some(in_stock),
    })
}

fn stock_from_cart_button(ctx: &PageContext<'_>) -> Option<StockInfo> {
    select_first(
        ctx.root,
        &[".single_add_to_cart_button", "form.cart button[type=submit]"],
    )?;
    Some(StockInfo {
        text: None,
        in_stock: Some(true),
    })
}

// ===== Descriptions =====

fn short_description(ctx: &PageContext<'_>) -> Option<String> {
    select_first(ctx.root, &[".woocommerce-product-details__short-description"])
        .and_then(block_text)
}

fn long_description_from_tab(ctx: &PageContext<'_>) -> Option<String> {
    select_first(
        ctx.root,
        &[
            "#tab-description",
            ".woocommerce-Tabs-panel--description",
            ".product-description",
        ],
    )
    .and_then(block_text)
}

fn long_description_from_json_ld(ctx: &PageContext<'_>) -> Option<String> {
    json_text(ctx.json_ld.as_ref()?.get("description"))
}

// ===== Additional information =====

fn extract_additional_info(ctx: &PageContext<'_>) -> Vec<AttributePair> {
    let mut pairs: Vec<AttributePair> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |key: String, value: String| {
        if !key.is_empty() && seen.insert(key.clone()) {
            pairs.push(AttributePair { key, value });
        }
    };

    for row in select_all(ctx.root, "#tab-additional_information tr") {
        if let (Some(th), Some(td)) = (select_first(row, &["th"]), select_first(row, &["td"])) {
            push(text_of(th), text_of(td));
        }
    }

    for row in select_all(ctx.root, ".woocommerce-product-attributes tr") {
        let label = select_first(row, &[".woocommerce-product-attributes-item__label"]);
        let value = select_first(row, &[".woocommerce-product-attributes-item__value"]);
        if let (Some(label), Some(value)) = (label, value) {
            push(text_of(label), text_of(value));
        }
    }

    pairs
}

fn attribute_value(pairs: &[AttributePair], key_fragment: &str) -> Option<String> {
    pairs
        .iter()
        .find(|p| p.key.to_lowercase().contains(key_fragment))
        .and_then(|p| non_empty(p.value.clone()))
}

// ===== Categories and tags =====

fn extract_categories(ctx: &PageContext<'_>) -> Vec<CategoryRef> {
    let mut categories = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for css in [".posted_in a", ".product_meta a[rel=tag]", "a[href]"] {
        for link in select_all(ctx.root, css) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.contains(ctx.category_marker) {
                continue;
            }
            let name = text_of(link);
            if name.is_empty() || !seen_names.insert(name.clone()) {
                continue;
            }
            let url = resolve_link(href, ctx.document_url).ok();
            categories.push(CategoryRef {
                name,
                slug: url.as_ref().map(slug_from_url).and_then(non_empty),
                url: url.map(String::from),
            });
        }
    }

    categories
}

fn extract_tags(ctx: &PageContext<'_>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for link in select_all(ctx.root, ".tagged_as a") {
        let tag = text_of(link);
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

// ===== Images =====

fn extract_images(ctx: &PageContext<'_>) -> ImageSet {
    let mut images = ImageSet::default();
    let mut seen: HashSet<String> = HashSet::new();

    let main_selectors = [
        ".woocommerce-product-gallery__image img",
        ".wp-post-image",
        ".product-image img",
        ".single-product img.attachment-shop_single",
    ];
    images.main = main_selectors
        .iter()
        .filter_map(|css| select_first(ctx.root, &[*css]))
        .find_map(|img| parse_image(img, ctx.document_url));
    if let Some(main) = &images.main {
        seen.insert(main.url.clone());
    }

    for css in [
        ".woocommerce-product-gallery__image",
        ".product-gallery-image",
        ".flex-control-thumbs img",
    ] {
        for element in select_all(ctx.root, css) {
            let img = if element.value().name() == "img" {
                Some(element)
            } else {
                select_first(element, &["img"])
            };

            let image = img
                .and_then(|img| parse_image(img, ctx.document_url))
                .or_else(|| large_image(element, ctx.document_url));

            if let Some(image) = image {
                if seen.insert(image.url.clone()) {
                    images.gallery.push(image);
                }
            }
        }
    }

    images
}

/// Builds an image from an `<img>`, preferring the widest srcset candidate
fn parse_image(img: ElementRef<'_>, page_url: &Url) -> Option<ProductImage> {
    let src = ["src", "data-src", "data-lazy-src"]
        .iter()
        .filter_map(|name| attr(img, name))
        .find_map(|src| resolve_asset(&src, page_url))?;

    let srcset = attr(img, "srcset")
        .or_else(|| attr(img, "data-srcset"))
        .map(|s| parse_srcset(&s, page_url))
        .unwrap_or_default();

    let url = srcset
        .iter()
        .filter(|entry| entry.width.is_some())
        .max_by_key(|entry| entry.width)
        .map(|entry| entry.url.clone())
        .unwrap_or_else(|| src.to_string());

    Some(ProductImage {
        url,
        alt: attr(img, "alt"),
        width: attr_u32(img, "width"),
        height: attr_u32(img, "height"),
        srcset,
    })
}

/// Gallery slides that only carry `data-large_image`
fn large_image(element: ElementRef<'_>, page_url: &Url) -> Option<ProductImage> {
    let src = attr(element, "data-large_image")?;
    let url = resolve_asset(&src, page_url)?;
    Some(ProductImage {
        width: attr_u32(element, "data-large_image_width"),
        height: attr_u32(element, "data-large_image_height"),
        ..ProductImage::new(url.to_string())
    })
}

fn parse_srcset(srcset: &str, page_url: &Url) -> Vec<SrcsetEntry> {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = resolve_asset(parts.next()?, page_url)?;
            let descriptor = parts.next();
            let width = descriptor
                .and_then(|d| d.strip_suffix('w'))
                .and_then(|w| w.parse::<u32>().ok());
            Some(SrcsetEntry {
                url: url.to_string(),
                width,
                descriptor: match width {
                    Some(_) => None,
                    None => descriptor.map(str::to_string),
                },
            })
        })
        .collect()
}

// ===== Ingredients, allergens, nutrition =====

const INGREDIENT_PREFIXES: &[&str] = &["ingredients:", "ingredient:"];
const ALLERGEN_PREFIXES: &[&str] = &["allergens:", "allergen:", "contains:", "may contain:"];

fn ingredients_from_section(ctx: &PageContext<'_>) -> Option<String> {
    let section = select_first(
        ctx.root,
        &[".ingredients", "#tab-ingredients", ".product-ingredients"],
    )?;
    let text = block_text(section)?.replace('\n', " ");
    Some(strip_label(&text, INGREDIENT_PREFIXES).unwrap_or(text))
}

fn ingredients_from_paragraph(ctx: &PageContext<'_>) -> Option<String> {
    labelled_paragraph(ctx, INGREDIENT_PREFIXES)
}

fn allergens_from_section(ctx: &PageContext<'_>) -> Option<String> {
    let section = select_first(ctx.root, &[".allergens", "#tab-allergens"])?;
    let text = block_text(section)?.replace('\n', " ");
    Some(strip_label(&text, ALLERGEN_PREFIXES).unwrap_or(text))
}

fn allergens_from_paragraph(ctx: &PageContext<'_>) -> Option<String> {
    labelled_paragraph(ctx, ALLERGEN_PREFIXES)
}

/// Text after a label such as "Ingredients:" in the first matching paragraph
fn labelled_paragraph(ctx: &PageContext<'_>, prefixes: &[&str]) -> Option<String> {
    select_all(ctx.root, "p, li")
        .into_iter()
        .find_map(|p| strip_label(&text_of(p), prefixes))
}

fn strip_label(text: &str, prefixes: &[&str]) -> Option<String> {
    let lowered = text.to_lowercase();
    prefixes
        .iter()
        .find(|prefix| lowered.starts_with(*prefix))
        .and_then(|prefix| text.get(prefix.len()..))
        .and_then(|rest| non_empty(rest.trim().to_string()))
}

/// Splits "Milk, Eggs and Soy." style lists, keeping first-seen order
fn split_allergens(text: &str) -> Vec<String> {
    let mut allergens: Vec<String> = Vec::new();
    for item in text.split([',', ';']) {
        let item = item.trim().trim_end_matches('.').trim();
        if item.is_empty() {
            continue;
        }
        if !allergens.iter().any(|a| a.eq_ignore_ascii_case(item)) {
            allergens.push(item.to_string());
        }
    }
    allergens
}

fn extract_nutrition(ctx: &PageContext<'_>) -> Vec<NutritionRow> {
    const KEYWORDS: &[&str] = &["nutrition", "calories", "fat", "protein"];
    let mut rows = Vec::new();

    for table in select_all(ctx.root, "table") {
        let headers = select_all(table, "th")
            .into_iter()
            .map(|th| text_of(th).to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        if !KEYWORDS.iter().any(|kw| headers.contains(kw)) {
            continue;
        }

        for tr in select_all(table, "tr") {
            let cells = select_all(tr, "th, td");
            if cells.len() < 2 || cells[1].value().name() != "td" {
                continue;
            }
            let label = text_of(cells[0]);
            if label.is_empty() {
                continue;
            }
            rows.push(NutritionRow {
                label,
                value: text_of(cells[1]),
            });
        }
    }

    rows
}

fn extract_nutrition_pdf(ctx: &PageContext<'_>) -> Option<String> {
    const KEYWORDS: &[&str] = &["nutrition", "ingredient", "spec"];

    select_all(ctx.root, "a[href]").into_iter().find_map(|link| {
        let href = link.value().attr("href")?;
        let href_lower = href.to_lowercase();
        let text_lower = text_of(link).to_lowercase();
        let relevant = href_lower.contains(".pdf")
            && KEYWORDS
                .iter()
                .any(|kw| href_lower.contains(kw) || text_lower.contains(kw));
        if !relevant {
            return None;
        }
        resolve_asset(href, ctx.document_url).map(String::from)
    })
}
