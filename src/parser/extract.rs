//! Shared extraction helpers for the page parsers
//!
//! Every helper returns `None` (or an empty collection) instead of failing:
//! a missing element is an ordinary outcome when scraping storefront markup.

use scraper::{ElementRef, Selector};
use serde_json::Value;
use tracing::trace;
use url::Url;

/// Compiles a CSS selector, logging and returning `None` on a bad pattern
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            trace!("Invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

/// First element matching any of `selectors`, in selector order
pub fn select_first<'a>(root: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| root.select(&sel).next())
}

/// All elements matching `css`, in document order
pub fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => root.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// First non-empty text among the elements matched by `selectors`
pub fn first_text(root: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|css| selector(css))
        .flat_map(|sel| root.select(&sel).map(text_of).collect::<Vec<_>>())
        .find(|text| !text.is_empty())
}

/// Text content of an element with whitespace runs collapsed
pub fn text_of(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    collapse_whitespace(&raw)
}

/// Text content with one line per text block, script and style removed
pub fn block_text(element: ElementRef<'_>) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();

    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if hidden {
            continue;
        }
        let line = collapse_whitespace(text);
        if !line.is_empty() {
            lines.push(line);
        }
    }

    non_empty(lines.join("\n"))
}

/// Trimmed, non-empty attribute value
pub fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Numeric attribute value (`width="600"`); zero counts as absent
pub fn attr_u32(element: ElementRef<'_>, name: &str) -> Option<u32> {
    attr(element, name)
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
}

/// True if the element carries `class`
pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c.eq_ignore_ascii_case(class))
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Resolves an asset reference (image, PDF) against the page URL
///
/// Unlike page links, assets keep their query string untouched.
pub fn resolve_asset(src: &str, page_url: &Url) -> Option<Url> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let url = page_url.join(src).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Splits a price string into its currency symbol and numeric text
///
/// `"$12.00"` gives `(Some("$"), Some("12.00"))`, `"12,50 €"` gives
/// `(Some("€"), Some("12,50"))`. Only the first amount of a range is kept.
/// The numeric part never contains the symbol.
pub fn split_currency(text: &str) -> (Option<String>, Option<String>) {
    let text = text.trim();
    let Some(start) = text.find(|c: char| c.is_ascii_digit()) else {
        return (None, None);
    };

    let rest = &text[start..];
    let len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());
    let amount = rest[..len].trim_end_matches(['.', ',']).to_string();

    let prefix = text[..start].split_whitespace().last().unwrap_or("");
    let symbol = if prefix.is_empty() {
        rest[len..]
            .split_whitespace()
            .next()
            .filter(|token| !token.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '–'))
            .unwrap_or("")
    } else {
        prefix
    };

    (non_empty(symbol.to_string()), non_empty(amount))
}

/// Finds the schema.org `Product` object among the page's JSON-LD blocks
pub fn json_ld_product(root: ElementRef<'_>) -> Option<Value> {
    for script in select_all(root, r#"script[type="application/ld+json"]"#) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            trace!("Skipping unparsable JSON-LD block");
            continue;
        };
        if let Some(product) = find_product(&value) {
            return Some(product.clone());
        }
    }
    None
}

fn find_product(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product),
        Value::Object(map) => {
            if is_product_type(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_product)
        }
        _ => None,
    }
}

fn is_product_type(ty: Option<&Value>) -> bool {
    match ty {
        Some(Value::String(s)) => s == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    }
}

/// A JSON-LD scalar as text (strings and numbers)
pub fn json_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The first offer of a JSON-LD product (`offers` may be an object or a list)
pub fn json_ld_offer(product: &Value) -> Option<&Value> {
    match product.get("offers")? {
        Value::Array(offers) => offers.first(),
        offer @ Value::Object(_) => Some(offer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_split_currency() {
        assert_eq!(
            split_currency("$12.00"),
            (Some("$".to_string()), Some("12.00".to_string()))
        );
        assert_eq!(
            split_currency("12,50 €"),
            (Some("€".to_string()), Some("12,50".to_string()))
        );
        assert_eq!(split_currency("1,299.00"), (None, Some("1,299.00".to_string())));
        assert_eq!(
            split_currency("From $10.00 – $20.00"),
            (Some("$".to_string()), Some("10.00".to_string()))
        );
        assert_eq!(split_currency("Free"), (None, None));
    }

    #[test]
    fn test_first_text_skips_empty_matches() {
        let doc = Html::parse_document(
            r#"<div><h1 class="title">  </h1><h1 class="title">Mint   Chip</h1></div>"#,
        );
        assert_eq!(
            first_text(doc.root_element(), &[".missing", "h1.title"]),
            Some("Mint Chip".to_string())
        );
    }

    #[test]
    fn test_block_text_drops_scripts() {
        let doc = Html::parse_document(
            r#"<div id="d"><p>Line one</p><script>var x = 1;</script><p> Line
            two </p></div>"#,
        );
        let div = select_first(doc.root_element(), &["#d"]).unwrap();
        assert_eq!(block_text(div), Some("Line one\nLine two".to_string()));
    }

    #[test]
    fn test_resolve_asset() {
        let page = Url::parse("https://example.com/product/a/").unwrap();
        assert_eq!(
            resolve_asset("/img/a.jpg?v=2", &page).unwrap().as_str(),
            "https://example.com/img/a.jpg?v=2"
        );
        assert!(resolve_asset("data:image/gif;base64,R0lGOD", &page).is_none());
        assert!(resolve_asset("", &page).is_none());
    }

    #[test]
    fn test_json_ld_product_in_graph() {
        let doc = Html::parse_document(
            r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
              {"@type":"WebPage","name":"Page"},
              {"@type":"Product","name":"Mint","sku":42,
               "offers":[{"price":"9.50","priceCurrency":"USD"}]}
            ]}</script></head><body></body></html>"#,
        );
        let product = json_ld_product(doc.root_element()).unwrap();
        assert_eq!(json_text(product.get("name")), Some("Mint".to_string()));
        assert_eq!(json_text(product.get("sku")), Some("42".to_string()));
        let offer = json_ld_offer(&product).unwrap();
        assert_eq!(json_text(offer.get("price")), Some("9.50".to_string()));
    }
}
