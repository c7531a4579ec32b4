//! HTTP client and end-to-end scraping against a mock server

mod common;

use common::{month, schedule_page};
use rota::crawler::{PageSource, ScheduleClient, ScheduleScraper, ScraperConfig};
use rota::error::{FetchError, FetchFailureKind};
use rota::parser::TableExtractor;
use rota::utils::retry::RecordingSleeper;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_page_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schedule/2024-01"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>ok</p>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ScheduleClient::new(&server.uri()).unwrap();
    let body = client.fetch_page("/schedule/2024-01").await.unwrap();
    assert_eq!(body, "<p>ok</p>");
}

#[tokio::test]
async fn test_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = ScheduleClient::new(&server.uri()).unwrap();

    let missing = client.fetch_page("/missing").await.unwrap_err();
    assert!(matches!(missing, FetchError::HttpStatus { status: 404, .. }));
    assert!(!missing.is_transient());

    let broken = client.fetch_page("/broken").await.unwrap_err();
    assert_eq!(broken.status_code(), Some(500));
    assert!(broken.is_transient());
}

#[tokio::test]
async fn test_decodes_declared_charset() {
    let server = MockServer::start().await;
    // "Zoë" in windows-1252
    let body = vec![b'Z', b'o', 0xEB];
    Mock::given(path("/latin"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=windows-1252"))
        .mount(&server)
        .await;

    let client = ScheduleClient::new(&server.uri()).unwrap();
    assert_eq!(client.fetch_page("/latin").await.unwrap(), "Zoë");
}

#[tokio::test]
async fn test_request_timeout_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client =
        ScheduleClient::with_config(&server.uri(), Duration::from_millis(100), Some("rota-test".into()))
            .unwrap();
    let err = client.fetch_page("/slow").await.unwrap_err();
    assert_eq!(err.kind(), FetchFailureKind::Network);
    assert!(err.is_transient());
}

#[test]
fn test_resolve_joins_relative_paths() {
    let client = ScheduleClient::new("https://rota.example.org/site/").unwrap();
    assert_eq!(
        client.resolve("schedule/2024-01").unwrap(),
        "https://rota.example.org/site/schedule/2024-01"
    );
    assert_eq!(
        client.resolve("/schedule/2024-01").unwrap(),
        "https://rota.example.org/schedule/2024-01"
    );
    assert_eq!(
        client.resolve("https://other.example.org/x").unwrap(),
        "https://other.example.org/x"
    );
}

#[tokio::test]
async fn test_scrape_recovers_from_server_errors() {
    let server = MockServer::start().await;
    Mock::given(path("/schedule/2024-01"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    html(
        &server,
        "/schedule/2024-01",
        schedule_page(&[("2024-01-02", "ON1", "Ana"), ("2024-01-02", "DAY", "Ben")]),
    )
    .await;
    html(
        &server,
        "/schedule/2024-02",
        schedule_page(&[("2024-02-02", "ON2", "Cy")]),
    )
    .await;

    let client = Arc::new(ScheduleClient::new(&server.uri()).unwrap());
    let sleeper = Arc::new(RecordingSleeper::new());
    let scraper = ScheduleScraper::new(
        client,
        Arc::new(TableExtractor::new()),
        ScraperConfig {
            rate_interval: Duration::ZERO,
            ..ScraperConfig::default()
        },
    )
    .with_sleeper(sleeper.clone());

    let outcome = scraper
        .scrape_schedule(month(2024, 1), 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.months_processed, 2);
    assert_eq!(outcome.months_failed, 0);
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );

    let requests = server.received_requests().await.unwrap();
    let january = requests
        .iter()
        .filter(|r| r.url.path() == "/schedule/2024-01")
        .count();
    assert_eq!(january, 3);
}
