//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock marketplaces and test the full
//! crawl cycle end-to-end: config file, HTTP fetcher, extraction and the
//! SQLite store.

use flipwatch::config::load_config_with_hash;
use flipwatch::crawler::Coordinator;
use flipwatch::output::RunReport;
use flipwatch::sites::SiteKind;
use flipwatch::storage::{open_storage, KeyFilter, RecordKind, RunStatus, Storage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHART: &str = r#"<html><body><script>
    function updateCanvas() {
        draw('Revenue', [100,200,300]); draw('Profit', [10,20,30]);
        var ticks = ["2021-01","2021-02","2021-03"];
    }
    var ticks = ["2021-01","2021-02","2021-03"];
    chart('Revenue', [100,200,300]);
</script></body></html>"#;

/// Writes a config file for one site and returns its path and the database path
fn write_config(dir: &TempDir, site: &str) -> (PathBuf, PathBuf) {
    let db_path = dir.path().join("flipwatch.db");
    let config = format!(
        r#"
[crawler]
max-concurrent-details = 4
request-timeout-secs = 5
max-retries = 1
retry-delay-ms = 10
max-index-pages = 20

[user-agent]
user-agent = "flipwatch-test/1.0"

[store]
database-path = "{}"

{}
"#,
        db_path.display(),
        site
    );

    let config_path = dir.path().join("flipwatch.toml");
    std::fs::write(&config_path, config).expect("Failed to write config");
    (config_path, db_path)
}

fn fei_site(base_url: &str, follow_details: bool) -> String {
    format!(
        r#"
[[site]]
kind = "fei"
start-url = "{}/buy-a-website/"
follow-details = {}
"#,
        base_url, follow_details
    )
}

async fn run_crawl(config_path: &Path) -> RunReport {
    let (config, hash) = load_config_with_hash(config_path).expect("Failed to load config");
    let coordinator = Coordinator::from_config(config, hash).expect("Failed to create coordinator");
    coordinator
        .run(CancellationToken::new())
        .await
        .expect("Crawl failed")
}

fn listing_block(post: &str, listing: &str, price: Option<&str>) -> String {
    let price = price
        .map(|p| {
            format!(
                r#"<dt class="listing-overview-item-title-asking-price">Asking Price</dt>
                   <dd class="listing-overview-item-asking-price">{}</dd>"#,
                p
            )
        })
        .unwrap_or_default();
    format!(
        r#"<div class="listing" data-listing-id="{listing}">
             <h2 class="listing-title"><a href="/listing/{post}/">Business {post}</a></h2>
             <dl>
               <dt class="listing-overview-item-title-yearly-revenue">Yearly Revenue</dt>
               <dd class="listing-overview-item-yearly-revenue">$100,000</dd>
               {price}
             </dl>
           </div>"#,
        listing = listing,
        post = post,
        price = price
    )
}

fn index_page(blocks: &[String], next: Option<&str>) -> String {
    let next = next
        .map(|href| format!(r#"<a class="next page-numbers" href="{}">Next</a>"#, href))
        .unwrap_or_default();
    format!(
        "<html><body><main>{}</main>{}</body></html>",
        blocks.concat(),
        next
    )
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// One FEI index page with two listings and their detail pages
async fn mount_fei_marketplace(server: &MockServer) {
    mount_page(
        server,
        "/buy-a-website/",
        index_page(
            &[
                listing_block("post-1", "listing-1", Some("$250,000")),
                listing_block("post-2", "listing-2", None),
            ],
            None,
        ),
    )
    .await;
    mount_page(server, "/listing/post-1/", CHART.to_string()).await;
    mount_page(server, "/listing/post-2/", CHART.to_string()).await;
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    mount_fei_marketplace(&server).await;

    let dir = TempDir::new().unwrap();
    let (config_path, db_path) = write_config(&dir, &fei_site(&server.uri(), true));

    let run = run_crawl(&config_path).await;
    let report = run.site(SiteKind::Fei).expect("FEI was not crawled");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(report.index_pages, 1);
    assert_eq!(report.listings_found, 2);
    assert_eq!(report.listings_persisted, 2);
    assert_eq!(report.details_fetched, 2);
    assert_eq!(report.details_failed, 0);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(
        storage
            .count_records(RecordKind::Listing, "fei_listings")
            .unwrap(),
        2
    );

    let details = storage
        .find(
            RecordKind::Detail,
            "fei_details",
            &KeyFilter::source(SiteKind::Fei).listing_id("listing-1"),
        )
        .unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(
        details[0]["series"]["Dates"],
        serde_json::json!(["2021-01", "2021-02", "2021-03"])
    );
    assert_eq!(
        details[0]["series"]["Revenue"],
        serde_json::json!(["100", "200", "300"])
    );

    let recorded = storage.get_run(run.run_id).unwrap();
    assert_eq!(recorded.status, RunStatus::Completed);
    assert!(recorded.finished_at.is_some());
    assert_eq!(recorded.report.unwrap().listings_persisted, 2);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_fei_marketplace(&server).await;

    let dir = TempDir::new().unwrap();
    let (config_path, db_path) = write_config(&dir, &fei_site(&server.uri(), true));

    run_crawl(&config_path).await;
    let second = run_crawl(&config_path).await;
    let report = second.site(SiteKind::Fei).unwrap();

    assert_eq!(report.listings_found, 2);
    assert_eq!(report.listings_persisted, 0);
    assert_eq!(report.listings_skipped, 2);
    assert_eq!(report.details_fetched, 0);
    assert_eq!(report.details_skipped, 2);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(
        storage
            .count_records(RecordKind::Listing, "fei_listings")
            .unwrap(),
        2
    );
    assert_eq!(
        storage
            .count_records(RecordKind::Detail, "fei_details")
            .unwrap(),
        2
    );

    // Detail pages were fetched by the first run only
    let requests = server.received_requests().await.unwrap();
    let detail_fetches = requests
        .iter()
        .filter(|r| r.url.path().starts_with("/listing/"))
        .count();
    assert_eq!(detail_fetches, 2);
}

#[tokio::test]
async fn test_pagination_visits_each_page_once() {
    let server = MockServer::start().await;

    // The bare start page matches last; `?page=N` requests hit their own mock
    for (page, next) in [("1", Some("?page=2")), ("2", Some("?page=3")), ("3", None)] {
        let response = ResponseTemplate::new(200).set_body_string(index_page(
            &[listing_block(
                &format!("post-{}", page),
                &format!("listing-{}", page),
                Some("$1"),
            )],
            next,
        ));
        let mock = Mock::given(method("GET")).and(path("/buy-a-website/"));
        let mock = if page == "1" {
            mock.respond_with(response).with_priority(10)
        } else {
            mock.and(query_param("page", page))
                .respond_with(response)
                .with_priority(1)
        };
        mock.expect(1)
        .mount(&server)
        .await;
    }

    let dir = TempDir::new().unwrap();
    let (config_path, db_path) = write_config(&dir, &fei_site(&server.uri(), false));

    let run = run_crawl(&config_path).await;
    let report = run.site(SiteKind::Fei).unwrap();

    assert_eq!(report.index_pages, 3);
    assert_eq!(report.listings_persisted, 3);

    let storage = open_storage(&db_path).unwrap();
    let stored = storage
        .find(
            RecordKind::Listing,
            "fei_listings",
            &KeyFilter::source(SiteKind::Fei),
        )
        .unwrap();
    let posts: Vec<&str> = stored
        .iter()
        .map(|doc| doc["post_id"].as_str().unwrap())
        .collect();
    assert_eq!(posts, vec!["post-1", "post-2", "post-3"]);
}

#[tokio::test]
async fn test_known_listing_is_not_stored_or_followed() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/buy-a-website/",
        index_page(
            &[
                listing_block("post-1", "listing-1", Some("$250,000")),
                listing_block("post-2", "listing-2", Some("$90,000")),
            ],
            None,
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/listing/post-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHART))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/listing/post-2/", CHART.to_string()).await;

    let dir = TempDir::new().unwrap();
    let (config_path, db_path) = write_config(&dir, &fei_site(&server.uri(), true));

    // The first run stores both listings and their detail records
    run_crawl(&config_path).await;

    // On the second run the stored listing is parsed but neither re-stored nor re-followed
    let storage = open_storage(&db_path).unwrap();
    let before = storage
        .find(
            RecordKind::Listing,
            "fei_listings",
            &KeyFilter::source(SiteKind::Fei)
                .post_id("post-1")
                .listing_id("listing-1"),
        )
        .unwrap();
    assert_eq!(before.len(), 1);

    let second = run_crawl(&config_path).await;
    let report = second.site(SiteKind::Fei).unwrap();
    assert_eq!(report.listings_found, 2);
    assert_eq!(report.listings_persisted, 0);
    assert_eq!(report.details_skipped, 2);
}

#[tokio::test]
async fn test_missing_price_persists_as_null() {
    let server = MockServer::start().await;
    mount_fei_marketplace(&server).await;

    let dir = TempDir::new().unwrap();
    let (config_path, db_path) = write_config(&dir, &fei_site(&server.uri(), false));

    run_crawl(&config_path).await;

    let storage = open_storage(&db_path).unwrap();
    let stored = storage
        .find(
            RecordKind::Listing,
            "fei_listings",
            &KeyFilter::source(SiteKind::Fei).listing_id("listing-2"),
        )
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0]["asking_price"].is_null());
    assert_eq!(stored[0]["yearly_revenue"], "$100,000");
    assert_eq!(stored[0]["title"], "Business post-2");
}

#[tokio::test]
async fn test_detail_failures_do_not_abort_run() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/buy-a-website/",
        index_page(
            &[
                listing_block("post-1", "listing-1", None),
                listing_block("post-2", "listing-2", None),
                listing_block("post-3", "listing-3", None),
            ],
            None,
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/listing/post-1/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/listing/post-2/",
        "<html><script>chart('Revenue', [1]);</script></html>".to_string(),
    )
    .await;
    mount_page(&server, "/listing/post-3/", CHART.to_string()).await;

    let dir = TempDir::new().unwrap();
    let (config_path, db_path) = write_config(&dir, &fei_site(&server.uri(), true));

    let run = run_crawl(&config_path).await;
    let report = run.site(SiteKind::Fei).unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(report.listings_persisted, 3);
    assert_eq!(report.details_fetched, 1);
    assert_eq!(report.details_failed, 2);
    assert_eq!(report.index_failures, 0);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(
        storage
            .count_records(RecordKind::Detail, "fei_details")
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_empire_embedded_listings() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/marketplace/",
        r#"<html><head><script>
            var for_sale_list = [{"listing_id": 41234, "post_id": 9001, "listing_price": 250000, "listing_title": "Amazon FBA pet supplies"}, {"listing_id": "41235", "post_id": "9002"}];
        </script></head><body></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(&server, "/listing/41234", CHART.to_string()).await;
    mount_page(&server, "/listing/41235", "<html></html>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let site = format!(
        r#"
[[site]]
kind = "empire"
start-url = "{}/marketplace/"
listings-collection = "ef_listings"
"#,
        server.uri()
    );
    let (config_path, db_path) = write_config(&dir, &site);

    let run = run_crawl(&config_path).await;
    let report = run.site(SiteKind::Empire).unwrap();

    assert_eq!(report.listings_persisted, 2);
    assert_eq!(report.details_fetched, 1);
    assert_eq!(report.details_failed, 1);

    let storage = open_storage(&db_path).unwrap();
    let listings = storage
        .find(
            RecordKind::Listing,
            "ef_listings",
            &KeyFilter::source(SiteKind::Empire).post_id("9001"),
        )
        .unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["listing_id"], "41234");
    assert_eq!(listings[0]["asking_price"], "250000");

    let details = storage
        .find(
            RecordKind::Detail,
            "empireflippers_details",
            &KeyFilter::source(SiteKind::Empire).listing_id("41234"),
        )
        .unwrap();
    assert_eq!(details[0]["series"]["Profit"], serde_json::json!(["10", "20", "30"]));
}

#[tokio::test]
async fn test_flippa_login_then_detail_listings() {
    let server = MockServer::start().await;
    std::env::set_var("FLIPWATCH_IT_FLIPPA_PASSWORD", "hunter2");

    mount_page(
        &server,
        "/login",
        r#"<html><body><form id="new_login_form" action="/login" method="post">
             <input type="hidden" name="authenticity_token" value="tok123">
             <input type="email" name="email"><input type="password" name="password">
           </form></body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("authenticity_token=tok123"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(2)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/websites",
        r#"<html><body><div class="ListingResults___listingResults x1">
             <a href="/10001-pet-blog">Pet blog</a>
             <a href="/10001-pet-blog"><img></a>
           </div></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &server,
        "/10001-pet-blog",
        r#"<html><body>
             <h1 class="ListingHero-propertyIdentifierLink">Pet blog</h1>
             <div id="platform">WordPress</div>
           </body></html>"#
            .to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let site = format!(
        r#"
[[site]]
kind = "flippa"
start-url = "{uri}/websites"

[site.login]
url = "{uri}/login"
form-selector = "form#new_login_form"
email = "me@example.com"
password-env = "FLIPWATCH_IT_FLIPPA_PASSWORD"
"#,
        uri = server.uri()
    );
    let (config_path, db_path) = write_config(&dir, &site);

    let run = run_crawl(&config_path).await;
    let report = run.site(SiteKind::Flippa).unwrap();

    assert_eq!(report.listings_found, 1);
    assert_eq!(report.listings_persisted, 1);
    assert_eq!(report.details_fetched, 1);

    let storage = open_storage(&db_path).unwrap();
    let listings = storage
        .find(
            RecordKind::Listing,
            "flippa_listings",
            &KeyFilter::source(SiteKind::Flippa).post_id("10001"),
        )
        .unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["title"], "Pet blog");
    assert_eq!(listings[0]["platform"], "WordPress");

    // Known posts are not followed again; each run logs in once
    let second = run_crawl(&config_path).await;
    assert_eq!(second.site(SiteKind::Flippa).unwrap().listings_skipped, 1);
    assert_eq!(second.site(SiteKind::Flippa).unwrap().details_fetched, 0);
}
