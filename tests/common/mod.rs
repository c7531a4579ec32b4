//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use rota::crawler::{PageSource, ScheduleScraper, ScraperConfig};
use rota::error::FetchError;
use rota::models::{AssignmentRecord, Partition, RecordSource, ShiftType, Specialty};
use rota::parser::TableExtractor;
use rota::utils::retry::RecordingSleeper;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// One `<tr>` in the default column layout
pub fn schedule_row(date: &str, shift: &str, person: &str) -> String {
    format!(
        "<tr><td>{date}</td><td>{shift}</td><td>07:00</td><td>19:00</td>\
         <td>Main</td><td>1</td><td>{person}</td></tr>"
    )
}

/// Full schedule page with a header row and the given `(date, shift, person)` rows
pub fn schedule_page(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(date, shift, person)| schedule_row(date, shift, person))
        .collect();
    format!(
        "<html><body><table>\
         <thead><tr><th>Date</th><th>Shift</th><th>Start</th><th>End</th>\
         <th>Location</th><th>Required</th><th>Person</th></tr></thead>\
         <tbody>{body}</tbody></table></body></html>"
    )
}

/// Scripted response for one request
#[derive(Debug, Clone)]
pub enum Reply {
    Page(String),
    Status(u16),
    Network,
}

/// In-process page source with per-path scripts.
///
/// Each path answers its scripted replies in order and repeats the last one;
/// unknown paths answer 404.
#[derive(Default)]
pub struct ScriptedSite {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn script(self, path: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), replies.into());
        self
    }

    pub fn page(self, path: &str, body: String) -> Self {
        self.script(path, vec![Reply::Page(body)])
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == path).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Status(404)),
            None => Reply::Status(404),
        }
    }
}

#[async_trait]
impl PageSource for ScriptedSite {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_reply(url) {
            Reply::Page(body) => Ok(body),
            Reply::Status(status) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Reply::Network => Err(FetchError::Network {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            }),
        }
    }
}

/// Scraper without rate limiting whose backoff sleeps return immediately
pub fn fast_scraper(site: Arc<ScriptedSite>) -> (ScheduleScraper, Arc<RecordingSleeper>) {
    fast_scraper_with(site, ScraperConfig::default())
}

pub fn fast_scraper_with(
    site: Arc<ScriptedSite>,
    config: ScraperConfig,
) -> (ScheduleScraper, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let config = ScraperConfig {
        rate_interval: Duration::ZERO,
        ..config
    };
    let scraper = ScheduleScraper::new(site, Arc::new(TableExtractor::new()), config)
        .with_sleeper(sleeper.clone());
    (scraper, sleeper)
}

pub fn month(year: i32, month: u32) -> Partition {
    Partition::new(year, month).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// `count` assignments spread over one month, cycling shift types and people
pub fn assignments(period_id: Uuid, count: usize) -> Vec<AssignmentRecord> {
    let shifts = ShiftType::all();
    (0..count)
        .map(|i| AssignmentRecord {
            period_id,
            date: date(2024, 3, (i % 28) as u32 + 1),
            shift_type: shifts[i % shifts.len()],
            person: format!("person-{i}"),
            specialty: if i % 3 == 0 {
                Specialty::Body
            } else {
                Specialty::Both
            },
            source: RecordSource::Spreadsheet,
        })
        .collect()
}

/// Spreadsheet covering March 2024 with every shift type staffed
pub fn sample_spreadsheet() -> String {
    [
        "date,shift_type,person,specialty",
        "2024-03-01,ON1,Ana,BODY_ONLY",
        "2024-03-01,ON2,Ben,BODY_ONLY",
        "2024-03-01,MidC,Cy,BODY_ONLY",
        "2024-03-01,MidL,Dee,BODY_ONLY",
        "2024-03-01,DAY,Eli,BODY_ONLY",
        "2024-03-02,ON1,Fay,BODY_ONLY",
    ]
    .join("\n")
}
