//! Integration tests for the ingestion core
//!
//! These tests use wiremock to create mock HTTP servers and exercise the
//! full acquire cycle end-to-end: routing, rate limiting, retries, and the
//! deduplicating ledger.

use silt::capability::{CapabilityParams, HttpParams};
use silt::config::{
    CapabilityEntry, Config, IngestConfig, OutputConfig, RateLimitSettings, RetrySettings,
};
use silt::dispatch::{AcquireOptions, AcquireStatus, Dispatcher};
use silt::ledger::{UrlFilter, UrlStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at a per-test database
fn create_test_config(db_dir: &TempDir, interval_ms: u64, max_retries: u32) -> Config {
    Config {
        ingest: IngestConfig {
            max_concurrent: 4,
            default_timeout_ms: 5_000,
        },
        rate_limit: RateLimitSettings {
            enabled: true,
            default_interval_ms: interval_ms,
            domains: HashMap::new(),
        },
        retry: RetrySettings {
            max_retries,
            retry_delay_ms: 10, // Very short for testing
            backoff_factor: 2.0,
        },
        output: OutputConfig {
            database_path: db_dir
                .path()
                .join("ledger.db")
                .to_string_lossy()
                .into_owned(),
        },
        capability: vec![CapabilityEntry {
            name: "http".to_string(),
            default: true,
            params: CapabilityParams::Http(HttpParams::default()),
        }],
        rule: vec![],
        fallback_domains: HashMap::new(),
    }
}

fn dispatcher(config: &Config) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::from_config(config).expect("Failed to build dispatcher"))
}

#[tokio::test]
async fn test_full_acquire_flow() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>Hello</body></html>".as_bytes().to_vec(), "text/html"),
        )
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 3);
    let dispatcher = dispatcher(&config);

    let url = format!("{}/page", mock_server.uri());
    let outcome = dispatcher
        .acquire(&url, &AcquireOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, AcquireStatus::Completed);
    let response = outcome.content.as_ref().unwrap();
    assert!(response.text().contains("Hello"));
    assert!(response.mime_type.contains("text/html"));

    // Ledger reflects the completed acquisition, checksum included
    let records = dispatcher.list_urls(&UrlFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, UrlStatus::Completed);
    assert_eq!(records[0].content_hash, outcome.content_hash);
    assert_eq!(records[0].process_count, 1);
}

#[tokio::test]
async fn test_reregistration_returns_same_id() {
    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 0);
    let dispatcher = dispatcher(&config);

    let first = dispatcher
        .register_url("https://a.com/x?b=2&a=1")
        .unwrap();
    let second = dispatcher
        .register_url("https://a.com/x?a=1&b=2")
        .unwrap();

    assert_eq!(first, second);

    let records = dispatcher.list_urls(&UrlFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].process_count, 2);
}

#[tokio::test]
async fn test_duplicate_content_across_urls_is_skipped() {
    let mock_server = MockServer::start().await;

    for endpoint in ["/one", "/two"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_string("identical bytes"))
            .mount(&mock_server)
            .await;
    }

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 0);
    let dispatcher = dispatcher(&config);

    let first = dispatcher
        .acquire(
            &format!("{}/one", mock_server.uri()),
            &AcquireOptions::default(),
        )
        .await
        .unwrap();
    let second = dispatcher
        .acquire(
            &format!("{}/two", mock_server.uri()),
            &AcquireOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(first.status, AcquireStatus::Completed);
    assert_eq!(
        second.status,
        AcquireStatus::DuplicateContent {
            original_id: first.url_id
        }
    );

    // The duplicate is Skipped, not Failed, and names the original
    let skipped = dispatcher
        .list_urls(&UrlFilter {
            status: Some(UrlStatus::Skipped),
            ..UrlFilter::default()
        })
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains(&first.url_id.to_string()));

    // Hash lookup returns the first producer
    let original = dispatcher
        .duplicate_by_hash(first.content_hash.as_ref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(original.id, first.url_id);
}

#[tokio::test]
async fn test_server_error_is_retried_until_exhaustion() {
    let mock_server = MockServer::start().await;

    // 1 initial attempt + 3 retries
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 3);
    let dispatcher = dispatcher(&config);

    let url = format!("{}/flaky", mock_server.uri());
    let outcome = dispatcher
        .acquire(&url, &AcquireOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, AcquireStatus::Failed);
    assert!(outcome
        .error
        .as_ref()
        .unwrap()
        .contains("All 4 fetch attempts failed"));

    // Every attempt was recorded under the URL context
    let issues = dispatcher.issues(&url);
    assert!(issues.summary().error_count >= 4);

    let records = dispatcher.list_urls(&UrlFilter::default()).unwrap();
    assert_eq!(records[0].status, UrlStatus::Failed);
}

#[tokio::test]
async fn test_not_found_is_never_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 3);
    let dispatcher = dispatcher(&config);

    let outcome = dispatcher
        .acquire(
            &format!("{}/missing", mock_server.uri()),
            &AcquireOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, AcquireStatus::Failed);
    assert!(outcome.error.unwrap().contains("404"));
}

#[tokio::test]
async fn test_rate_limiter_spaces_same_domain_requests() {
    let mock_server = MockServer::start().await;

    for endpoint in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_string(endpoint))
            .mount(&mock_server)
            .await;
    }

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 200, 0);
    let dispatcher = dispatcher(&config);

    let start = Instant::now();
    dispatcher
        .acquire(
            &format!("{}/a", mock_server.uri()),
            &AcquireOptions::default(),
        )
        .await
        .unwrap();
    dispatcher
        .acquire(
            &format!("{}/b", mock_server.uri()),
            &AcquireOptions::default(),
        )
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(150),
        "second request was not spaced: {:?}",
        elapsed
    );

    let stats = dispatcher.domain_stats("127.0.0.1").unwrap();
    assert_eq!(stats.request_count, 2);
    assert!(!stats.cumulative_wait.is_zero());

    // The wait surfaced as an informational notice on the second URL
    let issues = dispatcher.issues(&format!("{}/b", mock_server.uri()));
    assert!(issues
        .warnings
        .iter()
        .any(|w| w.message.contains("rate limited")));
}

#[tokio::test]
async fn test_batch_continues_past_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_string("good body"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 0);
    let dispatcher = dispatcher(&config);

    let urls = vec![
        format!("{}/good", mock_server.uri()),
        format!("{}/gone", mock_server.uri()),
        "not a url".to_string(),
    ];
    let report = dispatcher.acquire_all(&urls, &AcquireOptions::default()).await;

    assert_eq!(report.successful.len(), 1);
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .any(|f| f.url == "not a url" && f.error.contains("Invalid URL")));
}

#[tokio::test]
async fn test_completed_url_survives_reopen() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("persisted"))
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 0);
    let url = format!("{}/page", mock_server.uri());

    {
        let dispatcher = dispatcher(&config);
        let outcome = dispatcher
            .acquire(&url, &AcquireOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, AcquireStatus::Completed);
    }

    // A fresh dispatcher over the same database sees the completed row
    let reopened = dispatcher(&config);
    let outcome = reopened
        .acquire(&url, &AcquireOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.status, AcquireStatus::AlreadyCompleted);

    let records = reopened.list_urls(&UrlFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].process_count, 2);
}

#[tokio::test]
async fn test_concurrent_registration_of_one_url() {
    let db_dir = TempDir::new().unwrap();
    let config = create_test_config(&db_dir, 1, 0);
    let dispatcher = dispatcher(&config);

    let mut join_set = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let dispatcher = Arc::clone(&dispatcher);
        join_set.spawn(async move { dispatcher.register_url("https://a.com/race") });
    }

    let mut ids = Vec::new();
    while let Some(result) = join_set.join_next().await {
        ids.push(result.unwrap().unwrap());
    }

    // One row, every caller saw the same id
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    let records = dispatcher.list_urls(&UrlFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].process_count, 16);
}
