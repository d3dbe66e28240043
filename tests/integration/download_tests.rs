//! Download manager tests against a mock image host

use crate::common::*;
use listing_archiver::download::{part_path, DownloadOutcome, DownloadTarget};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_existing_destination_is_never_requested_again() {
    let harness = Harness::start().await;
    mount_image(&harness.server, "a.jpg", 1).await;

    let manager = download_manager(harness.images_dir("run"));
    let target = manager.target("MUG-1", 1, &harness.image_url("a.jpg"));

    let first = manager.fetch(&target.url, &target.destination).await;
    assert!(matches!(first, DownloadOutcome::Downloaded { bytes } if bytes > 0));
    assert_eq!(
        std::fs::read(&target.destination).unwrap(),
        b"jpeg bytes of a.jpg".to_vec()
    );
    assert!(!part_path(&target.destination).exists());

    let second = manager.fetch(&target.url, &target.destination).await;
    assert_eq!(second, DownloadOutcome::AlreadyPresent);
}

#[tokio::test]
async fn test_server_errors_use_the_whole_retry_budget() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/img/broken.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&harness.server)
        .await;

    let manager = download_manager(harness.images_dir("run"));
    let target = manager.target("1001", 1, &harness.image_url("broken.jpg"));

    match manager.fetch(&target.url, &target.destination).await {
        DownloadOutcome::Failed { attempts, error } => {
            assert_eq!(attempts, 3);
            assert!(error.contains("500"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    assert!(!target.destination.exists());
    assert!(!part_path(&target.destination).exists());
}

#[tokio::test]
async fn test_empty_body_counts_as_failure() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/img/empty.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&harness.server)
        .await;

    let manager = download_manager(harness.images_dir("run"));
    let target = manager.target("1001", 1, &harness.image_url("empty.jpg"));

    let outcome = manager.fetch(&target.url, &target.destination).await;
    assert!(matches!(outcome, DownloadOutcome::Failed { attempts: 3, .. }));
    assert!(!target.destination.exists());
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/img/flaky.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_image(&harness.server, "flaky.jpg", 1).await;

    let manager = download_manager(harness.images_dir("run"));
    let target = manager.target("1001", 1, &harness.image_url("flaky.jpg"));

    let outcome = manager.fetch(&target.url, &target.destination).await;
    assert!(matches!(outcome, DownloadOutcome::Downloaded { .. }));
    assert!(target.destination.exists());
}

#[tokio::test]
async fn test_batch_with_shared_destination_downloads_once() {
    let harness = Harness::start().await;
    mount_image(&harness.server, "first.jpg", 1).await;
    mount_image(&harness.server, "second.jpg", 0).await;
    mount_image(&harness.server, "other.jpg", 1).await;

    let manager = download_manager(harness.images_dir("run"));
    let shared = manager.target("1001", 1, &harness.image_url("first.jpg"));
    let duplicate = DownloadTarget {
        url: harness.image_url("second.jpg"),
        destination: shared.destination.clone(),
    };
    let other = manager.target("1001", 2, &harness.image_url("other.jpg"));

    let results = manager.fetch_all(vec![shared, duplicate, other]).await;
    assert_eq!(results.len(), 3);

    let downloaded = results
        .iter()
        .filter(|(_, o)| matches!(o, DownloadOutcome::Downloaded { .. }))
        .count();
    let present: Vec<_> = results
        .iter()
        .filter(|(_, o)| *o == DownloadOutcome::AlreadyPresent)
        .map(|(t, _)| t.url.clone())
        .collect();

    assert_eq!(downloaded, 2);
    assert_eq!(present, vec![harness.image_url("second.jpg")]);
}
