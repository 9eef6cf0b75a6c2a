use crate::catalog::ProductRecord;
use crate::output::OutputResult;
use crate::storage::write_atomic;
use std::path::Path;

/// Fixed column schema of `catalog.csv`
pub const CSV_COLUMNS: [&str; 20] = [
    "product_url",
    "slug",
    "name",
    "sku",
    "price_text",
    "currency_symbol",
    "regular_price",
    "sale_price",
    "stock_text",
    "in_stock",
    "short_description",
    "long_description",
    "categories",
    "tags",
    "main_image_url",
    "gallery_image_count",
    "ingredients",
    "allergens",
    "additional_information",
    "timestamp_collected",
];

/// Writes the flattened catalog, replacing any previous export
pub fn write_csv(path: &Path, records: &[ProductRecord]) -> OutputResult<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for record in records {
        writer.write_record(flatten(record))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    write_atomic(path, &bytes)?;
    Ok(())
}

fn flatten(record: &ProductRecord) -> [String; 20] {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    [
        record.product_url.clone(),
        record.slug.clone(),
        text(&record.name),
        text(&record.sku),
        text(&record.price_text),
        text(&record.currency_symbol),
        text(&record.regular_price),
        text(&record.sale_price),
        text(&record.stock_text),
        record.in_stock.map(|b| b.to_string()).unwrap_or_default(),
        text(&record.short_description),
        text(&record.long_description),
        join(record.categories.iter().map(|c| c.name.as_str())),
        join(record.tags.iter().map(String::as_str)),
        record
            .main_image
            .as_ref()
            .map(|image| image.url.clone())
            .unwrap_or_default(),
        record.gallery_images.len().to_string(),
        text(&record.ingredients),
        join(record.allergens.iter().map(String::as_str)),
        record
            .additional_information
            .iter()
            .map(|pair| format!("{}: {}", pair.key, pair.value))
            .collect::<Vec<_>>()
            .join("; "),
        record.timestamp_collected.to_rfc3339(),
    ]
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
