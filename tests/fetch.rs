//! Image fetcher against a loopback endpoint: retry, caching, interstitials,
//! validation and progress events.

mod common;

use common::TestServer;
use heritage_report::{
    FetchConfig, FetchError, ImageFetcher, ImageKind, Locator, ReportProgressCallback,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn config_for(server: &TestServer) -> FetchConfig {
    FetchConfig {
        download_endpoint: server.endpoint(),
        retry_backoff_ms: 10,
        timeout_secs: 2,
        max_attempts: 3,
        ..Default::default()
    }
}

fn locator(id: &str) -> Locator {
    Locator {
        id: id.to_string(),
        source: format!("https://drive.google.com/open?id={id}"),
    }
}

#[tokio::test]
async fn test_fetch_success_writes_valid_image() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let result = fetcher.fetch(&locator("img_plain_0001"), "primary_1").await;
    let img = result.image().expect("fetch should succeed");

    assert_eq!(img.kind, ImageKind::Png);
    assert_eq!((img.width, img.height), (64, 48));
    assert!(img.path.exists());
    assert!(img.path.starts_with(fetcher.temp_dir().unwrap()));
    assert_eq!(img.byte_size, std::fs::metadata(&img.path).unwrap().len());
    assert_eq!(server.hits("img_plain_0001"), 1);
}

#[tokio::test]
async fn test_same_id_is_fetched_once() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let first = fetcher.fetch(&locator("img_cached_0001"), "a").await;
    let second = fetcher.fetch(&locator("img_cached_0001"), "b").await;

    assert_eq!(server.hits("img_cached_0001"), 1);
    assert_eq!(first.image().unwrap().path, second.image().unwrap().path);
    assert_eq!(fetcher.stats().total_downloaded, 1);
}

#[tokio::test]
async fn test_failures_are_cached_too() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let first = fetcher.fetch(&locator("missing_0001"), "a").await;
    let second = fetcher.fetch(&locator("missing_0001"), "b").await;

    assert!(!first.is_success());
    assert!(!second.is_success());
    assert_eq!(server.hits("missing_0001"), 3, "one full retry cycle, not two");
}

#[tokio::test]
async fn test_http_error_retries_then_fails() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let result = fetcher.fetch(&locator("missing_0002"), "a").await;

    match result.error() {
        Some(FetchError::HttpStatus { id, status }) => {
            assert_eq!(id, "missing_0002");
            assert_eq!(*status, 404);
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert_eq!(server.hits("missing_0002"), 3);
    assert_eq!(fetcher.stats().total_failed, 1);
}

#[tokio::test]
async fn test_transient_errors_recover_within_budget() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let result = fetcher.fetch(&locator("flaky_0001"), "a").await;

    assert!(result.is_success(), "third attempt should succeed: {result:?}");
    assert_eq!(server.hits("flaky_0001"), 3);
}

#[tokio::test]
async fn test_single_attempt_budget_does_not_retry() {
    let Some(server) = TestServer::start() else { return };
    let config = FetchConfig {
        max_attempts: 1,
        ..config_for(&server)
    };
    let mut fetcher = ImageFetcher::new(&config).unwrap();

    let result = fetcher.fetch(&locator("flaky_0002"), "a").await;

    assert!(!result.is_success());
    assert_eq!(server.hits("flaky_0002"), 1);
}

#[tokio::test]
async fn test_interstitial_is_followed_with_token() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let result = fetcher.fetch(&locator("confirm_0001"), "big").await;

    let img = result.image().expect("confirmed download should succeed");
    assert_eq!(img.kind, ImageKind::Png);
    // Page request + confirmed request, both in a single attempt.
    assert_eq!(server.hits("confirm_0001"), 2);
}

#[tokio::test]
async fn test_non_image_body_is_rejected_and_removed() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();

    let result = fetcher.fetch(&locator("garbage_0001"), "junk").await;

    assert!(
        matches!(result.error(), Some(FetchError::InvalidImage { .. })),
        "got {result:?}"
    );
    assert_eq!(server.hits("garbage_0001"), 3);
    let leftovers = std::fs::read_dir(fetcher.temp_dir().unwrap()).unwrap().count();
    assert_eq!(leftovers, 0, "invalid downloads must not stay on disk");
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let Some(server) = TestServer::start() else { return };
    let config = FetchConfig {
        timeout_secs: 1,
        max_attempts: 1,
        ..config_for(&server)
    };
    let mut fetcher = ImageFetcher::new(&config).unwrap();

    let result = fetcher.fetch(&locator("slow_0001"), "slow").await;

    match result.error() {
        Some(FetchError::Timeout { id, secs }) => {
            assert_eq!(id, "slow_0001");
            assert_eq!(*secs, 1);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_covers_the_interstitial_hop() {
    let Some(server) = TestServer::start() else { return };
    // Each request alone fits the budget; page + confirmed download does not.
    let config = FetchConfig {
        timeout_secs: 1,
        max_attempts: 1,
        ..config_for(&server)
    };
    let mut fetcher = ImageFetcher::new(&config).unwrap();

    let started = Instant::now();
    let result = fetcher.fetch(&locator("lagconfirm_0001"), "big").await;

    assert!(
        matches!(result.error(), Some(FetchError::Timeout { secs: 1, .. })),
        "got {result:?}"
    );
    assert_eq!(server.hits("lagconfirm_0001"), 2);
    assert!(started.elapsed() < 2 * common::LAG_DELAY + Duration::from_millis(300));
}

#[tokio::test]
async fn test_fetch_all_keeps_order_and_isolates_failures() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();
    let locators = [
        locator("img_all_0001"),
        locator("missing_all_0001"),
        locator("img_all_0002"),
    ];

    let results = fetcher.fetch_all(&locators, "additional").await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert!(results[2].is_success());
    assert_eq!(results[1].error().unwrap().id(), "missing_all_0001");

    let stats = fetcher.stats();
    assert_eq!(stats.total_downloaded, 2);
    assert_eq!(stats.total_failed, 1);
    assert!(stats.total_bytes > 0);
}

#[tokio::test]
async fn test_export_names_follow_download_order() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();
    fetcher
        .fetch_all(&[locator("img_export_aaaa"), locator("img_export_bbbb")], "primary")
        .await;

    let out = tempfile::tempdir().unwrap();
    let copied = fetcher.export_to(out.path(), "Old_Souk").unwrap();

    let names: Vec<String> = copied
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["Old_Souk_1_img_expo.png", "Old_Souk_2_img_expo.png"]);
    assert!(copied.iter().all(|p| p.exists()));
}

#[tokio::test]
async fn test_fetch_after_cleanup_does_not_hit_network() {
    let Some(server) = TestServer::start() else { return };
    let mut fetcher = ImageFetcher::new(&config_for(&server)).unwrap();
    let dir = fetcher.temp_dir().unwrap().to_path_buf();

    fetcher.fetch(&locator("img_cleanup_0001"), "a").await;
    fetcher.cleanup();
    let result = fetcher.fetch(&locator("img_cleanup_0001"), "a").await;

    assert!(matches!(result.error(), Some(FetchError::StorageReleased { .. })));
    assert_eq!(server.hits("img_cleanup_0001"), 1);
    assert!(!dir.exists());
}

// ── Progress events ──────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ReportProgressCallback for Recorder {
    fn on_fetch_start(&self, total_images: usize) {
        self.events.lock().unwrap().push(format!("start {total_images}"));
    }
    fn on_image_start(&self, n: usize, _total: usize, hint: &str) {
        self.events.lock().unwrap().push(format!("begin {n} {hint}"));
    }
    fn on_image_complete(&self, n: usize, _total: usize, _bytes: u64) {
        self.events.lock().unwrap().push(format!("ok {n}"));
    }
    fn on_image_error(&self, n: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {n}"));
    }
    fn on_fetch_complete(&self, total: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total}"));
    }
}

#[tokio::test]
async fn test_progress_events_in_order() {
    let Some(server) = TestServer::start() else { return };
    let recorder = Arc::new(Recorder::default());
    let mut fetcher = ImageFetcher::new(&config_for(&server))
        .unwrap()
        .with_progress(Some(recorder.clone() as Arc<dyn ReportProgressCallback>));

    fetcher
        .fetch_all(&[locator("img_progress_01"), locator("missing_progress_01")], "additional")
        .await;

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 2",
            "begin 1 additional_1",
            "ok 1",
            "begin 2 additional_2",
            "err 2",
            "done 1/2",
        ]
    );
}
