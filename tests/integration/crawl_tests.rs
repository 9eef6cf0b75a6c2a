//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small storefront and run the full
//! crawl cycle end-to-end against it, with output in temporary directories.

use async_trait::async_trait;
use catalog_crawler::config::{validate, Config};
use catalog_crawler::crawler::{
    Coordinator, HttpResponse, ReqwestTransport, ShutdownSignal, Sleeper, Transport,
    TransportError,
};
use catalog_crawler::output::{read_catalog, CrawlReport, StopReason, CSV_COLUMNS};
use catalog_crawler::state::FailureKind;
use catalog_crawler::storage::{open_state_store, StateStore};
use catalog_crawler::CrawlError;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, out: &Path) -> Config {
    let mut config = Config::default();
    config.site.base_url = base_url.to_string();
    config.crawler.concurrency = 2;
    config.crawler.delay_secs = 0.0;
    config.crawler.timeout_secs = 5.0;
    config.crawler.backoff_base_secs = 0.01;
    config.crawler.backoff_max_secs = 0.05;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.dir = out.to_path_buf();
    validate(&config).expect("test config should be valid");
    config
}

fn listing_html(product_slugs: &[&str], extra: &str) -> String {
    let items: String = product_slugs
        .iter()
        .map(|slug| {
            format!(
                r#"<li class="product"><a class="woocommerce-LoopProduct-link" href="/product/{slug}/">{slug}</a></li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ul class="products">{items}</ul>{extra}</body></html>"#)
}

fn product_html(slug: &str) -> String {
    format!(
        r#"<html><body class="single-product">
        <div class="product">
          <h1 class="product_title entry-title">{slug} ice cream</h1>
          <p class="price"><span class="woocommerce-Price-amount amount"><span class="woocommerce-Price-currencySymbol">$</span>9.50</span></p>
          <p class="stock in-stock">In stock</p>
          <div class="product_meta"><span class="sku">SKU-{slug}</span></div>
        </div></body></html>"#
    )
}

async fn mount_page(server: &MockServer, page_path: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts `/store` listing the given products, each served once
async fn mount_store(server: &MockServer, slugs: &[&str]) {
    mount_page(server, "/store", listing_html(slugs, ""), 1).await;
    for slug in slugs {
        mount_page(server, &format!("/product/{}", slug), product_html(slug), 1).await;
    }
}

async fn get_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.to_string() == "GET")
        .count()
}

fn catalog_urls(out: &Path) -> Vec<String> {
    let mut urls: Vec<String> = read_catalog(&out.join("catalog.jsonl"))
        .unwrap()
        .into_iter()
        .map(|r| r.product_url)
        .collect();
    urls.sort();
    urls
}

fn catalog_lines(out: &Path) -> usize {
    fs::read_to_string(out.join("catalog.jsonl"))
        .unwrap()
        .lines()
        .count()
}

/// Records backoff waits without sleeping
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Real HTTP transport that triggers a stop after N product pages
struct InterruptingTransport {
    inner: ReqwestTransport,
    signal: ShutdownSignal,
    after: usize,
    products: AtomicUsize,
}

#[async_trait]
impl Transport for InterruptingTransport {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let response = self.inner.get(url, timeout).await;
        if url.path().starts_with("/product/")
            && self.products.fetch_add(1, Ordering::SeqCst) + 1 == self.after
        {
            self.signal.trigger();
        }
        response
    }

    async fn head(&self, url: &Url, timeout: Duration) -> Result<u16, TransportError> {
        self.inner.head(url, timeout).await
    }
}

#[tokio::test]
async fn test_listing_with_three_products() {
    let server = MockServer::start().await;
    mount_store(&server, &["honeycomb", "pistachio", "mint-chip"]).await;
    let out = TempDir::new().unwrap();

    let config = create_test_config(&server.uri(), out.path());
    let report = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(get_count(&server).await, 4);
    assert_eq!(catalog_lines(out.path()), 3);
    assert_eq!(report.products_found, 3);
    assert_eq!(report.new_products, 3);
    assert_eq!(report.errors_total, 0);
    assert_eq!(report.stop_reason, StopReason::Completed);

    let on_disk = CrawlReport::load(&out.path().join("report.json")).unwrap();
    assert_eq!(on_disk.errors_total, 0);
    assert_eq!(on_disk.products_found, 3);

    let records = read_catalog(&out.path().join("catalog.jsonl")).unwrap();
    let honeycomb = records
        .iter()
        .find(|r| r.slug == "honeycomb")
        .expect("honeycomb record");
    assert_eq!(honeycomb.name.as_deref(), Some("honeycomb ice cream"));
    assert_eq!(honeycomb.sku.as_deref(), Some("SKU-honeycomb"));
    assert_eq!(honeycomb.currency_symbol.as_deref(), Some("$"));
    assert_eq!(honeycomb.regular_price.as_deref(), Some("9.50"));
    assert_eq!(honeycomb.in_stock, Some(true));
}

#[tokio::test]
async fn test_rate_limited_product_succeeds_after_backoff() {
    let server = MockServer::start().await;
    mount_page(&server, "/store", listing_html(&["honeycomb"], ""), 1).await;
    Mock::given(method("GET"))
        .and(path("/product/honeycomb"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, "/product/honeycomb", product_html("honeycomb"), 1).await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server.uri(), out.path());
    config.crawler.retries = 3;
    let sleeper = Arc::new(RecordingSleeper::default());
    let transport = Arc::new(ReqwestTransport::from_config(&config).unwrap());
    let report = Coordinator::with_transport(config, false, transport, sleeper.clone())
        .run()
        .await
        .unwrap();

    let sleeps = sleeper.sleeps.lock().unwrap().clone();
    assert_eq!(sleeps.len(), 2);
    assert!(sleeps[1] > sleeps[0], "backoff waits {:?}", sleeps);
    assert_eq!(report.products_found, 1);
    assert_eq!(report.errors_total, 0);
}

#[tokio::test]
async fn test_not_found_product_is_recorded_without_retry() {
    let server = MockServer::start().await;
    mount_page(&server, "/store", listing_html(&["honeycomb", "discontinued"], ""), 1).await;
    mount_page(&server, "/product/honeycomb", product_html("honeycomb"), 1).await;
    Mock::given(method("GET"))
        .and(path("/product/discontinued"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let out = TempDir::new().unwrap();

    let config = create_test_config(&server.uri(), out.path());
    let report = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.products_found, 1);
    assert_eq!(report.errors_total, 1);
    assert_eq!(report.error_count(FailureKind::Permanent), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].url.ends_with("/product/discontinued"));
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(report.failures[0].status, Some(404));
}

#[tokio::test]
async fn test_exhausted_retries_are_recorded() {
    let server = MockServer::start().await;
    mount_page(&server, "/store", listing_html(&["melting"], ""), 1).await;
    Mock::given(method("GET"))
        .and(path("/product/melting"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server.uri(), out.path());
    config.crawler.retries = 2;
    let report = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.error_count(FailureKind::RetriesExhausted), 1);
    assert_eq!(report.failures[0].attempts, 2);
    assert_eq!(report.products_found, 0);
    assert_eq!(report.stop_reason, StopReason::Completed);
}

#[tokio::test]
async fn test_interrupted_crawl_resumes_without_refetching() {
    let server = MockServer::start().await;
    let slugs = ["a", "b", "c", "d", "e"];
    mount_store(&server, &slugs).await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server.uri(), out.path());
    config.crawler.concurrency = 1;

    // First run stops once two product pages have been fetched
    let signal = ShutdownSignal::new();
    let transport = Arc::new(InterruptingTransport {
        inner: ReqwestTransport::from_config(&config).unwrap(),
        signal: signal.clone(),
        after: 2,
        products: AtomicUsize::new(0),
    });
    let first = Coordinator::with_transport(
        config.clone(),
        false,
        transport,
        Arc::new(RecordingSleeper::default()),
    )
    .with_shutdown(signal)
    .run()
    .await
    .unwrap();

    assert_eq!(first.stop_reason, StopReason::Interrupted);
    assert_eq!(first.products_found, 2);
    assert_eq!(first.pending_remaining, 3);
    assert_eq!(catalog_lines(out.path()), 2);

    // Second run picks up the remaining three
    let second = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(second.stop_reason, StopReason::Completed);
    assert_eq!(second.new_products, 3);
    assert_eq!(second.products_found, 5);
    assert_eq!(second.pages_dispatched_run, 3);
    assert_eq!(catalog_lines(out.path()), 5);
    // Every page was fetched exactly once over both runs
    assert_eq!(get_count(&server).await, 6);
}

#[tokio::test]
async fn test_resume_matches_single_run() {
    let slugs = ["a", "b", "c", "d", "e", "f"];

    let single_server = MockServer::start().await;
    mount_store(&single_server, &slugs).await;
    let single_out = TempDir::new().unwrap();
    Coordinator::new(create_test_config(&single_server.uri(), single_out.path()), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let split_server = MockServer::start().await;
    mount_store(&split_server, &slugs).await;
    let split_out = TempDir::new().unwrap();
    let mut config = create_test_config(&split_server.uri(), split_out.path());
    config.crawler.max_pages = Some(3);
    let first = Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.stop_reason, StopReason::MaxPages);

    config.crawler.max_pages = None;
    Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let strip = |urls: Vec<String>, base: &str| -> Vec<String> {
        urls.into_iter().map(|u| u.replacen(base, "", 1)).collect()
    };
    assert_eq!(
        strip(catalog_urls(single_out.path()), &single_server.uri()),
        strip(catalog_urls(split_out.path()), &split_server.uri())
    );
}

#[tokio::test]
async fn test_max_pages_limits_total_dispatches() {
    let server = MockServer::start().await;
    mount_page(&server, "/store", listing_html(&["a", "b", "c", "d", "e"], ""), 1).await;
    for slug in ["a", "b", "c", "d", "e"] {
        Mock::given(method("GET"))
            .and(path(format!("/product/{}", slug)))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_html(slug)))
            .mount(&server)
            .await;
    }
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server.uri(), out.path());
    config.crawler.max_pages = Some(2);
    let report = Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(get_count(&server).await, 2);
    assert_eq!(report.stop_reason, StopReason::MaxPages);
    assert_eq!(report.pages_dispatched_total, 2);

    // The ceiling holds across runs
    let again = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(get_count(&server).await, 2);
    assert_eq!(again.pages_dispatched_run, 0);
    assert_eq!(again.stop_reason, StopReason::MaxPages);
}

#[tokio::test]
async fn test_product_linked_from_two_listings_is_collected_once() {
    let server = MockServer::start().await;
    let category_link = r#"<ul class="product-categories"><li class="cat-item"><a href="/product-category/pints/">Pints</a></li></ul>"#;
    mount_page(&server, "/store", listing_html(&["honeycomb", "mint"], category_link), 1).await;
    mount_page(
        &server,
        "/product-category/pints",
        listing_html(&["honeycomb", "vanilla"], category_link),
        1,
    )
    .await;
    for slug in ["honeycomb", "mint", "vanilla"] {
        mount_page(&server, &format!("/product/{}", slug), product_html(slug), 1).await;
    }
    let out = TempDir::new().unwrap();

    let report = Coordinator::new(create_test_config(&server.uri(), out.path()), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.listings_processed, 2);
    assert_eq!(catalog_lines(out.path()), 3);
    let urls = catalog_urls(out.path());
    assert_eq!(
        urls.iter().filter(|u| u.ends_with("/product/honeycomb")).count(),
        1
    );
}

#[tokio::test]
async fn test_completed_crawl_rerun_fetches_nothing() {
    let server = MockServer::start().await;
    mount_store(&server, &["a", "b"]).await;
    let out = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), out.path());

    Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    let rerun = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(get_count(&server).await, 3);
    assert_eq!(rerun.products_found, 2);
    assert_eq!(rerun.new_products, 0);
    assert_eq!(catalog_lines(out.path()), 2);
}

#[tokio::test]
async fn test_force_starts_fresh_catalog() {
    let server = MockServer::start().await;
    mount_page(&server, "/store", listing_html(&["a", "b"], ""), 2).await;
    mount_page(&server, "/product/a", product_html("a"), 2).await;
    mount_page(&server, "/product/b", product_html("b"), 2).await;
    let out = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), out.path());

    Coordinator::new(config.clone(), false)
        .unwrap()
        .run()
        .await
        .unwrap();
    let forced = Coordinator::new(config, true)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(forced.new_products, 2);
    assert_eq!(forced.pages_dispatched_total, 3);
    assert_eq!(catalog_lines(out.path()), 2);
}

#[tokio::test]
async fn test_corrupt_state_falls_back_to_fresh_crawl() {
    let server = MockServer::start().await;
    mount_store(&server, &["a", "b"]).await;
    let out = TempDir::new().unwrap();
    fs::write(out.path().join(".crawl_state.json"), b"{ not json").unwrap();

    let report = Coordinator::new(create_test_config(&server.uri(), out.path()), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.products_found, 2);
    assert_eq!(report.stop_reason, StopReason::Completed);

    // The corrupt file has been replaced by a valid snapshot
    let store = open_state_store(&out.path().join(".crawl_state.json"));
    let state = store.load().unwrap().expect("state saved");
    assert!(state.pending.is_empty());
    assert_eq!(state.visited.len(), 3);
}

#[tokio::test]
async fn test_csv_export_has_fixed_columns() {
    let server = MockServer::start().await;
    mount_store(&server, &["a", "b"]).await;
    let out = TempDir::new().unwrap();

    Coordinator::new(create_test_config(&server.uri(), out.path()), false)
        .unwrap()
        .run()
        .await
        .unwrap();

    let mut reader = csv::Reader::from_path(out.path().join("catalog.csv")).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, CSV_COLUMNS.to_vec());
    assert_eq!(reader.records().count(), 2);
}

#[tokio::test]
async fn test_images_downloaded_when_enabled() {
    let server = MockServer::start().await;
    mount_page(&server, "/store", listing_html(&["honeycomb"], ""), 1).await;
    let page = format!(
        r#"<html><body class="single-product"><h1 class="product_title">Honeycomb</h1>
        <div class="woocommerce-product-gallery__image"><img class="wp-post-image" src="{}/uploads/honeycomb.jpg" alt="Honeycomb"></div>
        <div class="woocommerce-product-gallery__image"><img src="{}/uploads/missing.jpg"></div>
        </body></html>"#,
        server.uri(),
        server.uri()
    );
    mount_page(&server, "/product/honeycomb", page, 1).await;
    Mock::given(method("GET"))
        .and(path("/uploads/honeycomb.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEG".to_vec()))
        .mount(&server)
        .await;
    let out = TempDir::new().unwrap();

    let mut config = create_test_config(&server.uri(), out.path());
    config.output.download_images = true;
    let report = Coordinator::new(config, false)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.products_found, 1);
    assert_eq!(report.images_downloaded, 1);
    assert_eq!(report.images_failed, 1);
    assert_eq!(report.errors_total, 0);
    let saved = out.path().join("images/honeycomb/01-honeycomb.jpg");
    assert_eq!(fs::read(saved).unwrap(), b"JPEG");
}

#[tokio::test]
async fn test_unreachable_base_url_is_fatal() {
    let out = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:1", out.path());

    let result = Coordinator::new(config, false).unwrap().run().await;
    assert!(matches!(result, Err(CrawlError::Unreachable { .. })));
    assert!(!out.path().join("report.json").exists());
}

#[tokio::test]
async fn test_unwritable_output_dir_is_fatal() {
    let server = MockServer::start().await;
    let scratch = TempDir::new().unwrap();
    let blocker = scratch.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();

    let config = create_test_config(&server.uri(), &blocker.join("out"));
    let result = Coordinator::new(config, false).unwrap().run().await;

    assert!(matches!(result, Err(CrawlError::OutputUnwritable { .. })));
    assert_eq!(get_count(&server).await, 0);
}
