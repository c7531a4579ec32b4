//! Test fixtures for integration tests
//!
//! Sample spreadsheets, a mock scheduling site and a fully wired orchestrator

use crate::common::schedule_page;
use rota::coverage::{CoverageRequirements, CoverageResolver};
use rota::crawler::{ScheduleClient, ScheduleScraper, ScraperConfig};
use rota::import::{DelimitedImporter, ScrapeImporter};
use rota::orchestrator::ImportOrchestrator;
use rota::parser::TableExtractor;
use rota::storage::SharedScheduleStore;
use rota::utils::retry::RecordingSleeper;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// March 2024 staffed by body-only readers
pub const MARCH_SPREADSHEET: &str = "\
Date,Shift Type,Person,Specialty
2024-03-01,ON1,Ana,BODY_ONLY
2024-03-01,ON2,Ben,BODY_ONLY
2024-03-01,MidC,Cy,BODY_ONLY
2024-03-01,MidL,Dee,BODY_ONLY
2024-03-01,DAY,Eli,BODY_ONLY
2024-03-02,MidL,Fay,BODY_ONLY
";

/// Two months; nobody on the overnight shifts in April
pub const TWO_MONTH_SPREADSHEET: &str = "\
date,shift_type,person,specialty
2024-03-05,DAY,Ana,BOTH
2024-03-05,MidL,Ben,NEURO_ONLY
2024-04-10,DAY,Cy,BODY_ONLY
";

/// Header is fine, but two rows are broken
pub const BROKEN_SPREADSHEET: &str = "\
date,shift_type,person
2024-03-01,ON1,Ana
03/32/2024,ON1,Ben
2024-03-03,SWING,Cy
";

/// Missing the person column entirely
pub const HEADERLESS_SPREADSHEET: &str = "\
date,shift_type
2024-03-01,ON1
";

/// External schedule for March 2024; staffed by a dual reader
pub fn march_site_page() -> String {
    schedule_page(&[
        ("2024-03-03", "ON1", "Gus"),
        ("2024-03-03", "DAY", "Hal"),
        ("2024-03-04", "Mid Late", "Ivy"),
    ])
}

pub async fn serve_month(server: &MockServer, key: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/schedule/{key}")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

pub async fn fail_month(server: &MockServer, key: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/schedule/{key}")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Orchestrator over `store` scraping `base_url` without real backoff sleeps
pub fn orchestrator(base_url: &str, store: SharedScheduleStore) -> ImportOrchestrator {
    let client = ScheduleClient::with_config(base_url, Duration::from_secs(2), None).unwrap();
    let scraper = ScheduleScraper::new(
        Arc::new(client),
        Arc::new(TableExtractor::new()),
        ScraperConfig {
            rate_interval: Duration::ZERO,
            ..ScraperConfig::default()
        },
    )
    .with_sleeper(Arc::new(RecordingSleeper::new()));

    ImportOrchestrator::new(
        Arc::new(DelimitedImporter::new(store.clone())),
        Arc::new(ScrapeImporter::new(Arc::new(scraper), store.clone())),
        Arc::new(CoverageResolver::new(store, CoverageRequirements::standard())),
    )
}
