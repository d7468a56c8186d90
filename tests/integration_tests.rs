//! Integration tests for fetchq
//!
//! These tests use wiremock to simulate HTTP servers and exercise the
//! built-in reqwest transport end to end: plain downloads, error statuses,
//! redirects, custom headers, timeouts and range continuation.


use fetchq::{DownloadEvent, DownloadId, DownloadStatus, Downloader, DownloaderConfig};
use std::time::Duration;
use tempfile::TempDir;
use test_helpers::{wait_for_event, Recorder};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a downloader rooted in a temp directory
fn create_test_downloader(temp_dir: &TempDir, config: DownloaderConfig) -> Downloader {
    let config = config.download_dir(temp_dir.path());
    Downloader::new(config).expect("Failed to create downloader")
}

fn terminal(id: DownloadId) -> impl Fn(&DownloadEvent) -> bool {
    move |e| e.id() == id && e.is_terminal()
}

// =============================================================================
// Basic Download Tests
// =============================================================================

#[tokio::test]
async fn test_basic_http_download() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    let test_content = b"Hello, World! This is test content for download.";

    Mock::given(method("GET"))
        .and(path("/test-file.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Length", test_content.len().to_string())
                .set_body_bytes(test_content.to_vec()),
        )
        .mount(&mock_server)
        .await;

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default());
    let mut events = dl.subscribe();
    let recorder = Recorder::new();

    let url = format!("{}/test-file.txt", mock_server.uri());
    let request = dl
        .new_request_in_default_dir(&url, "test-file.txt")
        .build()
        .expect("Failed to build request");
    let id = dl.enqueue(request, recorder.callbacks());

    let completed = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(
        matches!(completed, Some(DownloadEvent::Completed { .. })),
        "Download should complete, got {completed:?}"
    );

    let downloaded_file = temp_dir.path().join("test-file.txt");
    let content = tokio::fs::read(&downloaded_file).await.expect("Failed to read file");
    assert_eq!(content, test_content, "File content should match");
    assert!(!temp_dir.path().join("test-file.txt.temp").exists());

    let info = dl.status(id).expect("Should have status");
    assert_eq!(info.status, DownloadStatus::Completed);
    assert_eq!(info.progress.total_bytes, test_content.len() as u64);

    let log = recorder.log();
    assert_eq!(log.first().map(String::as_str), Some("start"));
    assert_eq!(log.last().map(String::as_str), Some("completed"));
    assert!(log.contains(&"progress:100".to_string()));
}

#[tokio::test]
async fn test_download_creates_missing_directories() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nested.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 2048]))
        .mount(&mock_server)
        .await;

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default());
    let mut events = dl.subscribe();

    let dir = temp_dir.path().join("a").join("b");
    let request = dl
        .new_request(format!("{}/nested.bin", mock_server.uri()), &dir, "nested.bin")
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let done = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(matches!(done, Some(DownloadEvent::Completed { .. })));
    assert_eq!(std::fs::metadata(dir.join("nested.bin")).unwrap().len(), 2048);
}

#[tokio::test]
async fn test_concurrent_downloads() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    for i in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/file{}.bin", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![i as u8; 10_000])
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&mock_server)
            .await;
    }

    let config = DownloaderConfig::default().max_concurrent_downloads(Some(2));
    let dl = create_test_downloader(&temp_dir, config);
    let mut events = dl.subscribe();

    let mut ids = Vec::new();
    for i in 0..3 {
        let request = dl
            .new_request_in_default_dir(
                format!("{}/file{}.bin", mock_server.uri(), i),
                format!("file{}.bin", i),
            )
            .tag("batch")
            .build()
            .unwrap();
        ids.push(dl.enqueue(request, Default::default()));
    }

    let mut completed = 0;
    while completed < ids.len() {
        let event = wait_for_event(
            &mut events,
            |e| matches!(e, DownloadEvent::Completed { .. }),
            Duration::from_secs(10),
        )
        .await;
        assert!(event.is_some(), "All downloads should complete");
        completed += 1;
    }

    for i in 0..3u8 {
        let content = std::fs::read(temp_dir.path().join(format!("file{}.bin", i))).unwrap();
        assert_eq!(content, vec![i; 10_000]);
    }
    assert_eq!(dl.list().len(), 3);
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[tokio::test]
async fn test_download_404_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default());
    let mut events = dl.subscribe();
    let recorder = Recorder::new();

    let request = dl
        .new_request_in_default_dir(format!("{}/missing.txt", mock_server.uri()), "missing.txt")
        .build()
        .unwrap();
    let id = dl.enqueue(request, recorder.callbacks());

    let failed = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    match failed {
        Some(DownloadEvent::Failed { error, .. }) => {
            assert!(error.contains("404"), "error should mention status: {error}")
        }
        other => panic!("Should fail, got {other:?}"),
    }

    assert_eq!(dl.status(id).unwrap().status, DownloadStatus::Failed);
    assert_eq!(recorder.log().len(), 2);
    assert!(!temp_dir.path().join("missing.txt").exists());
    assert!(!temp_dir.path().join("missing.txt.temp").exists());
}

#[tokio::test]
async fn test_connect_timeout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 16])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default());
    let mut events = dl.subscribe();

    let request = dl
        .new_request_in_default_dir(format!("{}/slow.bin", mock_server.uri()), "slow.bin")
        .connect_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let failed = wait_for_event(&mut events, terminal(id), Duration::from_secs(3)).await;
    assert!(matches!(failed, Some(DownloadEvent::Failed { .. })));
    assert_eq!(dl.status(id).unwrap().status, DownloadStatus::Failed);
}

#[test]
fn test_invalid_url() {
    let result = fetchq::DownloadRequest::builder("not-a-valid-url", "/tmp", "x").build();
    assert!(result.is_err(), "Should reject invalid URL");
}

// =============================================================================
// Headers and Redirects
// =============================================================================

#[tokio::test]
async fn test_custom_user_agent_and_headers() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    let custom_ua = "CustomAgent/1.0";
    Mock::given(method("GET"))
        .and(path("/ua-test.txt"))
        .and(header("User-Agent", custom_ua))
        .and(header("X-Token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"UA test content".to_vec()))
        .mount(&mock_server)
        .await;

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default().user_agent(custom_ua));
    let mut events = dl.subscribe();

    let request = dl
        .new_request_in_default_dir(format!("{}/ua-test.txt", mock_server.uri()), "ua-test.txt")
        .header("X-Token", "secret")
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let done = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(
        matches!(done, Some(DownloadEvent::Completed { .. })),
        "Download should complete with custom UA"
    );
}

#[tokio::test]
async fn test_redirect_updates_url() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"moved".to_vec()))
        .mount(&mock_server)
        .await;

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default());
    let mut events = dl.subscribe();

    let request = dl
        .new_request_in_default_dir(format!("{}/old", mock_server.uri()), "moved.txt")
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let done = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(matches!(done, Some(DownloadEvent::Completed { .. })));

    let info = dl.status(id).unwrap();
    assert_eq!(info.url, format!("{}/new", mock_server.uri()));
    // Identity is fixed at build time
    assert_eq!(info.id, id);
}

// =============================================================================
// Range Continuation Tests
// =============================================================================

#[tokio::test]
async fn test_range_resume_appends_to_partial_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    let full: Vec<u8> = (0..100u8).collect();
    Mock::given(method("GET"))
        .and(path("/partial.bin"))
        .and(header("Range", "bytes=40-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 40-99/100")
                .set_body_bytes(full[40..].to_vec()),
        )
        .mount(&mock_server)
        .await;

    tokio::fs::write(temp_dir.path().join("partial.bin.temp"), &full[..40])
        .await
        .unwrap();

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default().range_resume(true));
    let mut events = dl.subscribe();

    let request = dl
        .new_request_in_default_dir(format!("{}/partial.bin", mock_server.uri()), "partial.bin")
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let done = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(matches!(done, Some(DownloadEvent::Completed { .. })), "got {done:?}");

    let content = tokio::fs::read(temp_dir.path().join("partial.bin")).await.unwrap();
    assert_eq!(content, full);

    let info = dl.status(id).unwrap();
    assert_eq!(info.progress.downloaded_bytes, 100);
    assert_eq!(info.progress.total_bytes, 100);
}

#[tokio::test]
async fn test_range_ignored_restarts_from_zero() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    let full = vec![5u8; 64];
    Mock::given(method("GET"))
        .and(path("/norange.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(full.clone()))
        .mount(&mock_server)
        .await;

    tokio::fs::write(temp_dir.path().join("norange.bin.temp"), vec![9u8; 30])
        .await
        .unwrap();

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default().range_resume(true));
    let mut events = dl.subscribe();

    let request = dl
        .new_request_in_default_dir(format!("{}/norange.bin", mock_server.uri()), "norange.bin")
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let done = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(matches!(done, Some(DownloadEvent::Completed { .. })));

    let content = tokio::fs::read(temp_dir.path().join("norange.bin")).await.unwrap();
    assert_eq!(content, full);
}

#[tokio::test]
async fn test_stale_temp_file_is_overwritten_without_range_resume() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fresh.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    tokio::fs::write(temp_dir.path().join("fresh.bin.temp"), b"stale bytes that are longer")
        .await
        .unwrap();

    let dl = create_test_downloader(&temp_dir, DownloaderConfig::default());
    let mut events = dl.subscribe();

    let request = dl
        .new_request_in_default_dir(format!("{}/fresh.bin", mock_server.uri()), "fresh.bin")
        .build()
        .unwrap();
    let id = dl.enqueue(request, Default::default());

    let done = wait_for_event(&mut events, terminal(id), Duration::from_secs(10)).await;
    assert!(matches!(done, Some(DownloadEvent::Completed { .. })));
    assert_eq!(
        tokio::fs::read(temp_dir.path().join("fresh.bin")).await.unwrap(),
        b"fresh"
    );
}
