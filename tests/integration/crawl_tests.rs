//! Crawl engine tests
//!
//! The Trading API is mocked per call name; request bodies are matched on
//! the date filter or page number they carry.

use crate::common::*;
use listing_archiver::auth::CredentialError;
use listing_archiver::output::{load_seen, read_ledger, CrawlStatistics};
use listing_archiver::state::SeenSet;
use listing_archiver::storage::MemoryTokenStore;
use listing_archiver::{ArchiverError, PassKind};
use std::collections::BTreeSet;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CALL_HEADER: &str = "X-EBAY-API-CALL-NAME";
const TOKEN_HEADER: &str = "X-EBAY-API-IAF-TOKEN";

fn seller_list() -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path(TRADING_PATH))
        .and(header(CALL_HEADER, "GetSellerList"))
}

/// Serves `items` for every `GetSellerList` filtered on `pass`
async fn mount_pass(server: &MockServer, pass: &str, items: &[TestItem<'_>]) {
    seller_list()
        .and(body_string_contains(format!("<{}From>", pass).as_str()))
        .respond_with(xml_response(seller_list_xml(Some(1), items)))
        .mount(server)
        .await;
}

/// Serves `items` from `ActiveList` and nothing from the other selling lists
async fn mount_selling_lists(server: &MockServer, items: &[TestItem<'_>]) {
    for list in [
        "ActiveList",
        "SoldList",
        "UnsoldList",
        "DeletedFromSoldList",
        "DeletedFromUnsoldList",
    ] {
        let body = if list == "ActiveList" {
            selling_xml(list, items)
        } else {
            selling_xml(list, &[])
        };
        Mock::given(method("POST"))
            .and(path(TRADING_PATH))
            .and(header(CALL_HEADER, "GetMyeBaySelling"))
            .and(body_string_contains(format!("<{}>", list).as_str()))
            .respond_with(xml_response(body))
            .mount(server)
            .await;
    }
}

fn get_item() -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path(TRADING_PATH))
        .and(header(CALL_HEADER, "GetItem"))
}

fn unbounded_options() -> listing_archiver::crawler::CrawlOptions {
    let mut options = january_options(Vec::new());
    options.initial_scan = true;
    options
}

/// Zeroes the counters that depend on what is already on disk
fn without_downloads(mut stats: CrawlStatistics) -> CrawlStatistics {
    stats.images_downloaded = 0;
    stats.images_already_present = 0;
    stats.download_failures = 0;
    stats
}

#[tokio::test]
async fn test_items_are_not_counted_twice_across_passes() {
    let harness = Harness::start().await;
    let (a, b, c) = (
        harness.image_url("a.jpg"),
        harness.image_url("b.jpg"),
        harness.image_url("c.jpg"),
    );

    seller_list()
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[
                item("1001", Some("MUG-1"), vec![a.clone(), b.clone()]),
                item("1002", None, vec![c.clone()]),
            ],
        )))
        .expect(2)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let mut engine = harness.engine(
        "run",
        tokens,
        january_options(vec![PassKind::StartTime, PassKind::EndTime]),
        SeenSet::new(),
        false,
    );
    let stats = engine.run().await.unwrap();

    assert_eq!(stats.unique_items, 2);
    assert_eq!(stats.items_recorded, 2);
    assert_eq!(stats.ledger_rows, 3);
    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.windows_failed, 0);

    let rows = listing_archiver::output::read_ledger(&harness.ledger_path("run")).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.source == "StartTime"));
    assert_eq!(rows[0].sku, "MUG-1");
    assert_eq!(rows[0].window_start, "2024-01-01T00:00:00.000Z");
    assert_eq!(rows[0].window_end, "2024-01-31T23:59:59.000Z");
    assert_eq!(rows[2].sku, "");
}

#[tokio::test]
async fn test_pass_order_does_not_change_the_ledger_contents() {
    let mut outcomes = Vec::new();

    for passes in [
        vec![PassKind::StartTime, PassKind::ModTime],
        vec![PassKind::ModTime, PassKind::StartTime],
    ] {
        let harness = Harness::start().await;
        mount_pass(
            &harness.server,
            "StartTime",
            &[
                item("1", Some("A"), vec!["https://i.example.com/a.jpg".into()]),
                item("2", Some("B"), vec!["https://i.example.com/b.jpg".into()]),
            ],
        )
        .await;
        mount_pass(
            &harness.server,
            "ModTime",
            &[
                item(
                    "2",
                    Some("B"),
                    vec![
                        "https://i.example.com/b.jpg".into(),
                        "https://i.example.com/c.jpg".into(),
                    ],
                ),
                item("3", None, vec!["https://i.example.com/d.jpg".into()]),
            ],
        )
        .await;

        let tokens = harness.token_manager(None, store_with_token("access"));
        let mut engine = harness.engine("run", tokens, january_options(passes), SeenSet::new(), false);
        let stats = engine.run().await.unwrap();

        let pairs: BTreeSet<_> = ledger_pairs(&harness.ledger_path("run")).into_iter().collect();
        outcomes.push((stats.unique_items, stats.ledger_rows, pairs));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].0, 3);
    assert_eq!(outcomes[0].1, 4);
}

#[tokio::test]
async fn test_reruns_are_deduplicated_and_downloads_idempotent() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[
                item(
                    "1001",
                    Some("MUG 1/RED"),
                    vec![harness.image_url("a.jpg"), harness.image_url("b.jpg")],
                ),
                item("1002", None, vec![harness.image_url("c.png")]),
            ],
        )))
        .expect(3)
        .mount(&harness.server)
        .await;

    // Each image crosses the network exactly once over all three runs
    mount_image(&harness.server, "a.jpg", 1).await;
    mount_image(&harness.server, "b.jpg", 1).await;
    mount_image(&harness.server, "c.png", 1).await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let options = january_options(vec![PassKind::StartTime]);

    let first = harness
        .engine("run", tokens.clone(), options.clone(), SeenSet::new(), true)
        .run()
        .await
        .unwrap();
    assert_eq!(first.ledger_rows, 3);
    assert_eq!(first.images_downloaded, 3);

    let images = harness.images_dir("run");
    assert!(images.join("MUG1RED").join("MUG1RED_1.jpg").exists());
    assert!(images.join("MUG1RED").join("MUG1RED_2.jpg").exists());
    assert!(images.join("1002").join("1002_1.png").exists());
    assert!(!images.join("1002").join("1002_1.png.part").exists());

    // Resumed run: the ledger restores the seen set
    let restored = load_seen(&harness.ledger_path("run")).unwrap();
    assert_eq!(restored.len(), 2);
    let second = harness
        .engine("run", tokens.clone(), options.clone(), restored, true)
        .run()
        .await
        .unwrap();
    assert_eq!(second.unique_items, 2);
    assert_eq!(second.items_recorded, 0);
    assert_eq!(second.ledger_rows, 0);
    assert_eq!(second.images_downloaded, 0);
    assert_eq!(second.images_already_present, 3);

    // Fresh run: rows are written again but files on disk are kept
    let third = harness
        .engine("run", tokens, options, SeenSet::new(), true)
        .run()
        .await
        .unwrap();
    assert_eq!(third.ledger_rows, 3);
    assert_eq!(third.images_downloaded, 0);
    assert_eq!(third.images_already_present, 3);

    assert_eq!(ledger_pairs(&harness.ledger_path("run")).len(), 6);
}

#[tokio::test]
async fn test_http_401_refreshes_and_retries_once() {
    let harness = Harness::start().await;

    seller_list()
        .and(header(TOKEN_HEADER, "revoked-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    seller_list()
        .and(header(TOKEN_HEADER, "new-access"))
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[item("1", None, vec!["https://i.example.com/1.jpg".into()])],
        )))
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_refresh(&harness.server, "new-access", 1).await;

    let store = store_with_token("revoked-access");
    let tokens = harness.token_manager(Some("configured"), store.clone());
    let mut engine = harness.engine(
        "run",
        tokens.clone(),
        january_options(vec![PassKind::StartTime]),
        SeenSet::new(),
        false,
    );
    let stats = engine.run().await.unwrap();

    assert_eq!(stats.auth_retries, 1);
    assert_eq!(stats.ledger_rows, 1);
    assert_eq!(stats.windows_failed, 0);
    assert_eq!(tokens.refresh_count().await, 1);
    assert_eq!(store.snapshot().access.unwrap().value, "new-access");
}

#[tokio::test]
async fn test_expired_token_ack_refreshes_and_retries_once() {
    let harness = Harness::start().await;

    seller_list()
        .and(header(TOKEN_HEADER, "expired-access"))
        .respond_with(xml_response(failure_xml(
            "GetSellerList",
            21917053,
            "Expired IAF token.",
        )))
        .expect(1)
        .mount(&harness.server)
        .await;
    seller_list()
        .and(header(TOKEN_HEADER, "new-access"))
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[item("1", None, vec!["https://i.example.com/1.jpg".into()])],
        )))
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_refresh(&harness.server, "new-access", 1).await;

    let tokens = harness.token_manager(Some("configured"), store_with_token("expired-access"));
    let stats = harness
        .engine("run", tokens, january_options(vec![PassKind::StartTime]), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.auth_retries, 1);
    assert_eq!(stats.ledger_rows, 1);
    assert_eq!(harness.requests_to(TRADING_PATH).await, 2);
}

#[tokio::test]
async fn test_second_rejection_abandons_the_window_only() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&harness.server)
        .await;
    mount_refresh(&harness.server, "new-access", 1).await;

    let tokens = harness.token_manager(Some("configured"), store_with_token("old-access"));
    let stats = harness
        .engine("run", tokens, january_options(vec![PassKind::StartTime]), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.windows_failed, 1);
    assert_eq!(stats.auth_retries, 1);
    assert_eq!(stats.ledger_rows, 0);
}

#[tokio::test]
async fn test_missing_credentials_abort_before_any_request() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(xml_response(seller_list_xml(Some(1), &[])))
        .expect(0)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(None, MemoryTokenStore::new());
    let result = harness
        .engine("run", tokens, january_options(vec![PassKind::StartTime]), SeenSet::new(), false)
        .run()
        .await;

    assert!(matches!(
        result,
        Err(ArchiverError::Credential(CredentialError::MissingRefreshToken))
    ));
}

#[tokio::test]
async fn test_failed_validation_refreshes_before_crawling() {
    let harness = Harness::start().await;

    Mock::given(method("POST"))
        .and(path(TRADING_PATH))
        .and(header(CALL_HEADER, "GeteBayOfficialTime"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    seller_list()
        .and(header(TOKEN_HEADER, "new-access"))
        .respond_with(xml_response(seller_list_xml(Some(1), &[])))
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_refresh(&harness.server, "new-access", 1).await;

    let tokens = harness.token_manager(Some("configured"), store_with_token("old-access"));
    let mut options = january_options(vec![PassKind::StartTime]);
    options.validate_token = true;

    let stats = harness
        .engine("run", tokens, options, SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    // Validation is not part of the auth-retry protocol
    assert_eq!(stats.auth_retries, 0);
    assert_eq!(stats.pages_fetched, 1);
}

#[tokio::test]
async fn test_failed_window_does_not_stop_the_pass() {
    let harness = Harness::start().await;

    seller_list()
        .and(body_string_contains("<StartTimeFrom>2024-01-01T00:00:00.000Z</StartTimeFrom>"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&harness.server)
        .await;
    seller_list()
        .and(body_string_contains("<StartTimeFrom>2024-02-01T00:00:00.000Z</StartTimeFrom>"))
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[item("2", Some("FEB"), vec!["https://i.example.com/feb.jpg".into()])],
        )))
        .expect(1)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let stats = harness
        .engine(
            "run",
            tokens,
            options(vec![PassKind::StartTime], date(2024, 1, 1), date(2024, 2, 29)),
            SeenSet::new(),
            false,
        )
        .run()
        .await
        .unwrap();

    assert_eq!(stats.windows_failed, 1);
    assert_eq!(stats.ledger_rows, 1);
    let rows = listing_archiver::output::read_ledger(&harness.ledger_path("run")).unwrap();
    assert_eq!(rows[0].window_start, "2024-02-01T00:00:00.000Z");
}

#[tokio::test]
async fn test_api_failure_is_not_retried() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(xml_response(failure_xml(
            "GetSellerList",
            10007,
            "Internal error to the application.",
        )))
        .expect(1)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(Some("configured"), store_with_token("access"));
    let stats = harness
        .engine("run", tokens.clone(), january_options(vec![PassKind::StartTime]), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.windows_failed, 1);
    assert_eq!(stats.auth_retries, 0);
    assert_eq!(tokens.refresh_count().await, 0);
}

#[tokio::test]
async fn test_pages_follow_reported_total() {
    let harness = Harness::start().await;

    seller_list()
        .and(body_string_contains("<PageNumber>1</PageNumber>"))
        .respond_with(xml_response(seller_list_xml(
            Some(2),
            &[item("1", None, vec!["https://i.example.com/1.jpg".into()])],
        )))
        .expect(1)
        .mount(&harness.server)
        .await;
    seller_list()
        .and(body_string_contains("<PageNumber>2</PageNumber>"))
        .respond_with(xml_response(seller_list_xml(
            Some(2),
            &[item("2", None, vec!["https://i.example.com/2.jpg".into()])],
        )))
        .expect(1)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let stats = harness
        .engine("run", tokens, january_options(vec![PassKind::EndTime]), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.unique_items, 2);
}

#[tokio::test]
async fn test_missing_page_count_stops_after_first_page() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(xml_response(seller_list_xml(
            None,
            &[item("1", None, vec!["https://i.example.com/1.jpg".into()])],
        )))
        .expect(1)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let stats = harness
        .engine("run", tokens, january_options(vec![PassKind::ModTime]), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 1);
    assert_eq!(stats.ledger_rows, 1);
}

#[tokio::test]
async fn test_unbounded_scan_covers_every_selling_list() {
    let harness = Harness::start().await;

    for list in [
        "ActiveList",
        "SoldList",
        "UnsoldList",
        "DeletedFromSoldList",
        "DeletedFromUnsoldList",
    ] {
        let items = if list == "SoldList" {
            vec![item("77", Some("SOLD-1"), vec!["https://i.example.com/s.jpg".into()])]
        } else {
            Vec::new()
        };
        Mock::given(method("POST"))
            .and(path(TRADING_PATH))
            .and(header(CALL_HEADER, "GetMyeBaySelling"))
            .and(body_string_contains(format!("<{}>", list).as_str()))
            .respond_with(xml_response(selling_xml(list, &items)))
            .expect(1)
            .mount(&harness.server)
            .await;
    }

    let tokens = harness.token_manager(None, store_with_token("access"));
    let mut options = january_options(Vec::new());
    options.initial_scan = true;

    let stats = harness
        .engine("run", tokens, options, SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 5);
    assert_eq!(stats.unique_items, 1);

    let rows = listing_archiver::output::read_ledger(&harness.ledger_path("run")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, "Unbounded");
    assert_eq!(rows[0].sku, "SOLD-1");
}

#[tokio::test]
async fn test_fresh_reruns_reproduce_statistics_and_rows() {
    let harness = Harness::start().await;
    mount_pass(
        &harness.server,
        "StartTime",
        &[
            item("1", Some("A"), vec![harness.image_url("a.jpg")]),
            item("2", Some("B"), vec![harness.image_url("b.jpg")]),
        ],
    )
    .await;
    mount_pass(
        &harness.server,
        "ModTime",
        &[
            item("2", Some("B"), vec![harness.image_url("b.jpg"), harness.image_url("c.jpg")]),
            item("3", None, vec![harness.image_url("d.jpg")]),
        ],
    )
    .await;
    for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
        mount_image(&harness.server, name, 1).await;
    }

    let tokens = harness.token_manager(None, store_with_token("access"));
    let options = january_options(vec![PassKind::StartTime, PassKind::ModTime]);

    let first = harness
        .engine("run", tokens.clone(), options.clone(), SeenSet::new(), true)
        .run()
        .await
        .unwrap();
    let second = harness
        .engine("run", tokens, options, SeenSet::new(), true)
        .run()
        .await
        .unwrap();

    assert_eq!(first.images_downloaded, 4);
    assert_eq!(second.images_already_present, 4);
    assert_eq!(without_downloads(first.clone()), without_downloads(second));
    assert_eq!(first.unique_items, 3);
    assert_eq!(first.ledger_rows, 4);

    let rows = read_ledger(&harness.ledger_path("run")).unwrap();
    assert_eq!(rows.len(), 8);
    let (first_rows, second_rows) = rows.split_at(4);
    assert_eq!(first_rows, second_rows);
}

#[tokio::test]
async fn test_interrupted_then_resumed_run_matches_a_clean_run() {
    let harness = Harness::start().await;
    mount_pass(
        &harness.server,
        "StartTime",
        &[
            item("1", Some("A"), vec![harness.image_url("a.jpg")]),
            item("2", Some("B"), vec![harness.image_url("b.jpg")]),
        ],
    )
    .await;
    mount_pass(
        &harness.server,
        "ModTime",
        &[
            item("2", Some("B"), vec![harness.image_url("b.jpg"), harness.image_url("c.jpg")]),
            item("3", None, vec![harness.image_url("d.jpg")]),
        ],
    )
    .await;
    // Once for the clean run, once for the split one
    for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
        mount_image(&harness.server, name, 2).await;
    }

    let tokens = harness.token_manager(None, store_with_token("access"));
    let both = january_options(vec![PassKind::StartTime, PassKind::ModTime]);

    let clean = harness
        .engine("clean", tokens.clone(), both.clone(), SeenSet::new(), true)
        .run()
        .await
        .unwrap();

    // Stopped after the first pass
    let partial = harness
        .engine(
            "split",
            tokens.clone(),
            january_options(vec![PassKind::StartTime]),
            SeenSet::new(),
            true,
        )
        .run()
        .await
        .unwrap();
    let restored = load_seen(&harness.ledger_path("split")).unwrap();
    let resumed = harness
        .engine("split", tokens, both, restored, true)
        .run()
        .await
        .unwrap();

    assert_eq!(resumed.unique_items, clean.unique_items);
    assert_eq!(partial.ledger_rows + resumed.ledger_rows, clean.ledger_rows);
    assert_eq!(
        partial.items_recorded + resumed.items_recorded,
        clean.items_recorded
    );
    assert_eq!(
        partial.images_downloaded + resumed.images_downloaded,
        clean.images_downloaded
    );
    assert_eq!(resumed.images_already_present, 2);
    assert_eq!(
        read_ledger(&harness.ledger_path("split")).unwrap(),
        read_ledger(&harness.ledger_path("clean")).unwrap()
    );
}

#[tokio::test]
async fn test_resumed_run_retries_failed_downloads() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[item("1001", Some("MUG-1"), vec![harness.image_url("a.jpg")])],
        )))
        .expect(2)
        .mount(&harness.server)
        .await;
    // The image host is down for the whole first run
    Mock::given(method("GET"))
        .and(path("/img/a.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&harness.server)
        .await;
    mount_image(&harness.server, "a.jpg", 1).await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let options = january_options(vec![PassKind::StartTime]);
    let destination = harness.images_dir("run").join("MUG-1").join("MUG-1_1.jpg");

    let first = harness
        .engine("run", tokens.clone(), options.clone(), SeenSet::new(), true)
        .run()
        .await
        .unwrap();
    assert_eq!(first.ledger_rows, 1);
    assert_eq!(first.download_failures, 1);
    assert!(!destination.exists());

    let restored = load_seen(&harness.ledger_path("run")).unwrap();
    let second = harness
        .engine("run", tokens, options, restored, true)
        .run()
        .await
        .unwrap();

    assert_eq!(second.ledger_rows, 0);
    assert_eq!(second.images_downloaded, 1);
    assert_eq!(second.download_failures, 0);
    assert_eq!(std::fs::read(&destination).unwrap(), b"jpeg bytes of a.jpg".to_vec());
}

#[tokio::test]
async fn test_resumed_run_downloads_images_recorded_before_an_interrupt() {
    let harness = Harness::start().await;

    seller_list()
        .respond_with(xml_response(seller_list_xml(
            Some(1),
            &[
                item("1001", Some("MUG-1"), vec![harness.image_url("a.jpg")]),
                item("1002", None, vec![harness.image_url("b.png")]),
            ],
        )))
        .expect(2)
        .mount(&harness.server)
        .await;
    mount_image(&harness.server, "a.jpg", 1).await;
    mount_image(&harness.server, "b.png", 1).await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let options = january_options(vec![PassKind::StartTime]);

    // Ledger rows land before any download starts
    let first = harness
        .engine("run", tokens.clone(), options.clone(), SeenSet::new(), false)
        .run()
        .await
        .unwrap();
    assert_eq!(first.ledger_rows, 2);
    assert_eq!(first.images_downloaded, 0);

    let restored = load_seen(&harness.ledger_path("run")).unwrap();
    let second = harness
        .engine("run", tokens, options, restored, true)
        .run()
        .await
        .unwrap();

    assert_eq!(second.ledger_rows, 0);
    assert_eq!(second.images_downloaded, 2);
    let images = harness.images_dir("run");
    assert!(images.join("MUG-1").join("MUG-1_1.jpg").exists());
    assert!(images.join("1002").join("1002_1.png").exists());
}

#[tokio::test]
async fn test_selling_items_without_pictures_are_looked_up() {
    let harness = Harness::start().await;

    mount_selling_lists(
        &harness.server,
        &[
            item("88", Some("BARE-1"), Vec::new()),
            item("77", Some("FULL-1"), vec![harness.image_url("full.jpg")]),
        ],
    )
    .await;
    get_item()
        .and(body_string_contains("<ItemID>88</ItemID>"))
        .respond_with(xml_response(get_item_xml(&item(
            "88",
            None,
            vec![harness.image_url("bare.jpg")],
        ))))
        .expect(1)
        .mount(&harness.server)
        .await;
    get_item()
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.server)
        .await;
    mount_image(&harness.server, "bare.jpg", 1).await;
    mount_image(&harness.server, "full.jpg", 1).await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let stats = harness
        .engine("run", tokens, unbounded_options(), SeenSet::new(), true)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.item_lookups, 1);
    assert_eq!(stats.unique_items, 2);
    assert_eq!(stats.ledger_rows, 2);
    assert_eq!(stats.images_downloaded, 2);

    let rows = read_ledger(&harness.ledger_path("run")).unwrap();
    let bare = rows.iter().find(|r| r.item_id == "88").unwrap();
    assert_eq!(bare.image_url, harness.image_url("bare.jpg"));
    assert_eq!(bare.sku, "BARE-1");
    assert!(harness
        .images_dir("run")
        .join("BARE-1")
        .join("BARE-1_1.jpg")
        .exists());
}

#[tokio::test]
async fn test_expired_token_during_item_lookup_refreshes_and_retries() {
    let harness = Harness::start().await;

    mount_selling_lists(&harness.server, &[item("88", None, Vec::new())]).await;
    get_item()
        .and(header(TOKEN_HEADER, "old-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    get_item()
        .and(header(TOKEN_HEADER, "new-access"))
        .respond_with(xml_response(get_item_xml(&item(
            "88",
            Some("LOOKED-UP"),
            vec!["https://i.example.com/88.jpg".into()],
        ))))
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_refresh(&harness.server, "new-access", 1).await;

    let tokens = harness.token_manager(Some("configured"), store_with_token("old-access"));
    let stats = harness
        .engine("run", tokens, unbounded_options(), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.auth_retries, 1);
    assert_eq!(stats.item_lookups, 1);
    let rows = read_ledger(&harness.ledger_path("run")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sku, "LOOKED-UP");
}

#[tokio::test]
async fn test_failed_item_lookup_keeps_the_window() {
    let harness = Harness::start().await;

    mount_selling_lists(&harness.server, &[item("88", Some("BARE-1"), Vec::new())]).await;
    get_item()
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&harness.server)
        .await;

    let tokens = harness.token_manager(None, store_with_token("access"));
    let stats = harness
        .engine("run", tokens, unbounded_options(), SeenSet::new(), false)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.item_lookups, 0);
    assert_eq!(stats.windows_failed, 0);
    assert_eq!(stats.pages_fetched, 5);
    assert_eq!(stats.unique_items, 1);
    assert_eq!(stats.ledger_rows, 0);
}
