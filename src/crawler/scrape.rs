//! Concurrent month-by-month schedule scraping
//!
//! One scrape run partitions the requested range into months, submits one
//! job per month to a [`WorkerPool`] scoped to the run, and merges results
//! in completion order. Each job drives a [`PartitionMachine`]: every attempt
//! passes the shared [`RateLimiter`], transient failures back off and retry,
//! anything else fails the partition. Failed partitions are listed in the
//! outcome; only total failure or early cancellation is an error.

use super::client::PageSource;
use super::outcome::{BatchFetchOutcome, PartitionFailure};
use super::pool::{PoolConfig, SeenKeys, WorkerPool};
use super::rate_limit::RateLimiter;
use super::state::{PartitionEvent, PartitionMachine, PartitionState};
use crate::error::{Error, Result};
use crate::models::{FetchTask, Partition};
use crate::parser::{Extraction, ScheduleExtractor};
use crate::utils::error::{FetchError, FetchFailureKind, PoolError};
use crate::utils::retry::{RetryConfig, Sleeper, TokioSleeper};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// How many partitions must succeed for a scrape to count as successful
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuccessPolicy {
    /// Required fraction of requested partitions, 0.0..=1.0.
    /// At least one partition must succeed regardless.
    pub min_success_ratio: f64,
}

impl Default for SuccessPolicy {
    fn default() -> Self {
        Self {
            min_success_ratio: 0.0,
        }
    }
}

impl SuccessPolicy {
    pub fn is_satisfied(&self, succeeded: usize, total: usize) -> bool {
        succeeded > 0 && total > 0 && succeeded as f64 / total as f64 >= self.min_success_ratio
    }
}

/// Scraper settings
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Path for one month, `{month}` is replaced by `YYYY-MM`
    pub path_template: String,
    pub pool: PoolConfig,
    /// Minimum spacing between outbound requests
    pub rate_interval: Duration,
    pub retry: RetryConfig,
    pub success_policy: SuccessPolicy,
    /// Pause before the single resubmission of a job rejected with `QueueFull`
    pub queue_full_backoff: Duration,
    /// Drop rows whose date lies outside the partition they were fetched for
    pub restrict_to_partition: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            path_template: "/schedule/{month}".to_string(),
            pool: PoolConfig::default(),
            rate_interval: Duration::from_secs(1),
            retry: RetryConfig::default(),
            success_policy: SuccessPolicy::default(),
            queue_full_backoff: Duration::from_millis(100),
            restrict_to_partition: false,
        }
    }
}

// ============================================================================
// Partition Worker
// ============================================================================

/// What a job reports back for its partition
#[derive(Debug)]
struct PartitionReport {
    task: FetchTask,
    result: std::result::Result<Extraction, FetchError>,
}

/// Everything a job needs, cheap to clone into each one
#[derive(Clone)]
struct PartitionWorker {
    source: Arc<dyn PageSource>,
    extractor: Arc<dyn ScheduleExtractor>,
    limiter: Arc<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryConfig,
}

impl PartitionWorker {
    async fn fetch_once(&self, url: &str) -> std::result::Result<Extraction, FetchError> {
        let body = self.source.fetch_page(url).await?;
        self.extractor
            .extract(&body)
            .map_err(|e| FetchError::Parse {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn run(&self, mut task: FetchTask, token: &CancellationToken) -> PartitionReport {
        let mut machine = PartitionMachine::new(self.retry.clone());

        let result = loop {
            if let PartitionState::Retrying { attempt, delay, last } = machine.state() {
                debug!(
                    partition = %task.partition,
                    attempt = *attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last,
                    "retrying partition after backoff"
                );
                let delay = *delay;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break Err(FetchError::Cancelled),
                    _ = self.sleeper.sleep(delay) => {}
                }
            }

            if !self.limiter.wait_or_cancel(token).await {
                break Err(FetchError::Cancelled);
            }

            machine.apply(PartitionEvent::Dispatch);
            task.retry_count = machine.retries();

            let attempt = tokio::select! {
                biased;
                _ = token.cancelled() => break Err(FetchError::Cancelled),
                r = self.fetch_once(&task.url) => r,
            };

            match attempt {
                Ok(extraction) => {
                    machine.apply(PartitionEvent::Succeeded);
                    break Ok(extraction);
                }
                Err(e) => {
                    if let PartitionState::Failed { error, .. } =
                        machine.apply(PartitionEvent::Failed(e))
                    {
                        break Err(error.clone());
                    }
                }
            }
        };

        task.retry_count = machine.retries();
        match &result {
            Ok(extraction) => debug!(
                partition = %task.partition,
                records = extraction.shifts.len(),
                retries = task.retry_count,
                "partition succeeded"
            ),
            Err(e) => warn!(
                partition = %task.partition,
                retries = task.retry_count,
                error = %e,
                "partition failed"
            ),
        }

        PartitionReport { task, result }
    }
}

// ============================================================================
// Scraper
// ============================================================================

/// Fetches a range of months concurrently and merges them into one outcome
pub struct ScheduleScraper {
    worker: PartitionWorker,
    config: ScraperConfig,
}

impl ScheduleScraper {
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: Arc<dyn ScheduleExtractor>,
        config: ScraperConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_interval));
        Self {
            worker: PartitionWorker {
                source,
                extractor,
                limiter,
                sleeper: Arc::new(TokioSleeper),
                retry: config.retry.clone(),
            },
            config,
        }
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.worker.sleeper = sleeper;
        self
    }

    /// Share a rate limiter with other scrapers hitting the same site
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.worker.limiter = limiter;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.worker.limiter
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Request path for one partition
    pub fn url_for(&self, partition: Partition) -> String {
        partition.path(&self.config.path_template)
    }

    /// Submit a partition job, resubmitting once after a short pause if the
    /// queue is full
    async fn submit(
        &self,
        pool: &WorkerPool,
        task: &FetchTask,
        reports: &mpsc::UnboundedSender<PartitionReport>,
        token: &CancellationToken,
    ) -> std::result::Result<(), PoolError> {
        let make_job = || {
            let worker = self.worker.clone();
            let task = task.clone();
            let reports = reports.clone();
            move |job_token: CancellationToken| async move {
                let report = worker.run(task, &job_token).await;
                let _ = reports.send(report);
            }
        };

        match pool.submit(make_job()) {
            Err(PoolError::QueueFull { .. }) => {
                warn!(partition = %task.partition, "queue full, retrying submission once");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(PoolError::Closed),
                    _ = tokio::time::sleep(self.config.queue_full_backoff) => {}
                }
                pool.submit(make_job())
            }
            other => other,
        }
    }

    /// Fetch `count` months starting at `start`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` if `count` is zero
    /// - `Error::Cancelled` if `token` fires before any partition succeeds
    /// - `Error::TotalFetchFailure` if every partition failed
    /// - `Error::InsufficientSuccess` if the success policy is not met
    pub async fn scrape_schedule(
        &self,
        start: Partition,
        count: u32,
        token: &CancellationToken,
    ) -> Result<BatchFetchOutcome> {
        self.scrape_schedule_with(start, count, token, &SeenKeys::new())
            .await
    }

    /// Like [`scrape_schedule`](Self::scrape_schedule), deduplicating against
    /// a caller-owned key set.
    ///
    /// Keys already in `seen` count as duplicates; every kept record's key is
    /// added, so one set shared across runs dedups all of them.
    #[instrument(skip(self, token, seen), fields(already_seen = seen.len()))]
    pub async fn scrape_schedule_with(
        &self,
        start: Partition,
        count: u32,
        token: &CancellationToken,
        seen: &SeenKeys,
    ) -> Result<BatchFetchOutcome> {
        if count == 0 {
            return Err(Error::InvalidInput(
                "month count must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let partitions = Partition::range(start, count);
        info!(months = partitions.len(), "starting schedule scrape");

        let run_token = token.child_token();
        let pool = WorkerPool::new(self.config.pool, run_token.clone());
        let (tx, mut rx) = mpsc::unbounded_channel::<PartitionReport>();
        let mut outcome = BatchFetchOutcome::new(partitions.len());
        let mut pending: HashMap<Partition, FetchTask> = HashMap::new();

        for partition in &partitions {
            let task = FetchTask::new(*partition, self.url_for(*partition));
            match self.submit(&pool, &task, &tx, token).await {
                Ok(()) => {
                    pending.insert(*partition, task);
                }
                Err(e) => {
                    let kind = match e {
                        PoolError::QueueFull { .. } => FetchFailureKind::QueueFull,
                        PoolError::Closed => FetchFailureKind::Cancelled,
                    };
                    if token.is_cancelled() {
                        outcome.cancelled = true;
                    }
                    outcome
                        .warnings
                        .push(format!("{partition}: not scheduled ({e})"));
                    outcome.record_failure(PartitionFailure {
                        partition: *partition,
                        url: task.url.clone(),
                        kind,
                        message: e.to_string(),
                        status_code: None,
                        attempts: 0,
                    });
                }
            }
        }
        drop(tx);

        while !pending.is_empty() {
            let report = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                report = rx.recv() => report,
            };
            let Some(report) = report else { break };
            pending.remove(&report.task.partition);
            self.merge(&mut outcome, report, seen);
        }

        if outcome.cancelled {
            run_token.cancel();
        } else {
            pool.shutdown().await;
        }
        for (partition, task) in pending.drain() {
            outcome.record_failure(PartitionFailure {
                partition,
                url: task.url,
                kind: FetchFailureKind::Cancelled,
                message: FetchError::Cancelled.to_string(),
                status_code: None,
                attempts: 0,
            });
        }

        outcome.failures.sort_by_key(|f| f.partition);
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            processed = outcome.months_processed,
            failed = outcome.months_failed,
            records = outcome.records.len(),
            duplicates = outcome.duplicate_count,
            cancelled = outcome.cancelled,
            elapsed_ms = outcome.elapsed_ms,
            "schedule scrape finished"
        );

        self.finish(outcome)
    }

    fn merge(&self, outcome: &mut BatchFetchOutcome, report: PartitionReport, seen: &SeenKeys) {
        let PartitionReport { task, result } = report;
        match result {
            Ok(extraction) => {
                outcome.months_processed += 1;
                outcome.warnings.extend(
                    extraction
                        .warnings
                        .into_iter()
                        .map(|w| format!("{}: {w}", task.partition)),
                );
                for shift in extraction.shifts {
                    if self.config.restrict_to_partition && !task.partition.contains(shift.date) {
                        continue;
                    }
                    if seen.check_and_mark(&shift.natural_key()) {
                        outcome.records.push(shift);
                    } else {
                        outcome.duplicate_count += 1;
                    }
                }
            }
            Err(error) => {
                outcome.record_failure(PartitionFailure {
                    partition: task.partition,
                    url: task.url,
                    kind: error.kind(),
                    message: error.to_string(),
                    status_code: error.status_code(),
                    attempts: task.retry_count + 1,
                });
            }
        }
    }

    fn finish(&self, outcome: BatchFetchOutcome) -> Result<BatchFetchOutcome> {
        let succeeded = outcome.months_processed;
        let total = outcome.months_requested;

        if succeeded == 0 {
            return if outcome.cancelled {
                Err(Error::Cancelled)
            } else {
                Err(Error::TotalFetchFailure {
                    failures: outcome.failures,
                })
            };
        }

        let policy = self.config.success_policy;
        if !policy.is_satisfied(succeeded, total) {
            return Err(Error::InsufficientSuccess {
                succeeded,
                total,
                required_ratio: policy.min_success_ratio,
                outcome: Box::new(outcome),
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TableExtractor;
    use crate::utils::retry::RecordingSleeper;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn page(rows: &[(&str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(date, shift)| format!("<tr><td>{date}</td><td>{shift}</td></tr>"))
            .collect();
        format!("<table><tbody>{body}</tbody></table>")
    }

    /// Serves pages keyed by path; unknown paths answer 404
    struct FakeSite {
        pages: HashMap<String, std::result::Result<String, u16>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn new(pages: Vec<(&str, std::result::Result<String, u16>)>) -> Self {
            Self {
                pages: pages.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
        }
    }

    #[async_trait]
    impl PageSource for FakeSite {
        async fn fetch_page(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn scraper(site: Arc<FakeSite>, sleeper: Arc<RecordingSleeper>) -> ScheduleScraper {
        let config = ScraperConfig {
            rate_interval: Duration::ZERO,
            ..Default::default()
        };
        ScheduleScraper::new(site, Arc::new(TableExtractor::new()), config).with_sleeper(sleeper)
    }

    fn jan() -> Partition {
        Partition::new(2024, 1).unwrap()
    }

    #[test]
    fn test_success_policy() {
        let default = SuccessPolicy::default();
        assert!(default.is_satisfied(1, 6));
        assert!(!default.is_satisfied(0, 6));

        let strict = SuccessPolicy {
            min_success_ratio: 0.5,
        };
        assert!(strict.is_satisfied(3, 6));
        assert!(!strict.is_satisfied(2, 6));
    }

    #[tokio::test]
    async fn test_zero_months_is_invalid() {
        let site = Arc::new(FakeSite::new(vec![]));
        let result = scraper(site, Arc::new(RecordingSleeper::new()))
            .scrape_schedule(jan(), 0, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_merges_and_deduplicates() {
        let site = Arc::new(FakeSite::new(vec![
            (
                "/schedule/2024-01",
                Ok(page(&[("2024-01-30", "ON1"), ("2024-01-31", "ON1")])),
            ),
            (
                "/schedule/2024-02",
                Ok(page(&[("2024-01-31", "ON1"), ("2024-02-01", "ON1")])),
            ),
        ]));
        let outcome = scraper(site, Arc::new(RecordingSleeper::new()))
            .scrape_schedule(jan(), 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.months_processed, 2);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.duplicate_count, 1);
        assert_eq!(outcome.total_records(), 4);
        assert!(!outcome.has_errors());
    }

    #[tokio::test]
    async fn test_restrict_to_partition_drops_adjacent_days() {
        let site = Arc::new(FakeSite::new(vec![(
            "/schedule/2024-01",
            Ok(page(&[("2023-12-31", "ON1"), ("2024-01-01", "ON1")])),
        )]));
        let config = ScraperConfig {
            rate_interval: Duration::ZERO,
            restrict_to_partition: true,
            ..Default::default()
        };
        let outcome = ScheduleScraper::new(site, Arc::new(TableExtractor::new()), config)
            .scrape_schedule(jan(), 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.duplicate_count, 0);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let site = Arc::new(FakeSite::new(vec![(
            "/schedule/2024-01",
            Ok(page(&[("2024-01-01", "DAY")])),
        )]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let outcome = scraper(Arc::clone(&site), Arc::clone(&sleeper))
            .scrape_schedule(jan(), 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.months_failed, 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.kind, FetchFailureKind::HttpStatus);
        assert_eq!(failure.status_code, Some(404));
        assert_eq!(failure.attempts, 1);
        assert_eq!(site.calls_to("/schedule/2024-02"), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let site = Arc::new(FakeSite::new(vec![
            ("/schedule/2024-01", Ok(page(&[("2024-01-01", "DAY")]))),
            ("/schedule/2024-02", Err(503)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let outcome = scraper(Arc::clone(&site), Arc::clone(&sleeper))
            .scrape_schedule(jan(), 2, &CancellationToken::new())
            .await
            .unwrap();

        let failure = &outcome.failures[0];
        assert_eq!(failure.kind, FetchFailureKind::RetryExhausted);
        assert_eq!(failure.status_code, Some(503));
        assert_eq!(failure.attempts, 4);
        assert_eq!(site.calls_to("/schedule/2024-02"), 4);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_table_is_parse_failure() {
        let site = Arc::new(FakeSite::new(vec![
            ("/schedule/2024-01", Ok(page(&[("2024-01-01", "DAY")]))),
            ("/schedule/2024-02", Ok("<p>down for maintenance</p>".to_string())),
        ]));
        let outcome = scraper(site, Arc::new(RecordingSleeper::new()))
            .scrape_schedule(jan(), 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.failures[0].kind, FetchFailureKind::Parse);
    }

    #[tokio::test]
    async fn test_all_failures_is_error() {
        let site = Arc::new(FakeSite::new(vec![]));
        let result = scraper(site, Arc::new(RecordingSleeper::new()))
            .scrape_schedule(jan(), 3, &CancellationToken::new())
            .await;
        match result {
            Err(Error::TotalFetchFailure { failures }) => assert_eq!(failures.len(), 3),
            other => panic!("expected total failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insufficient_success_carries_outcome() {
        let site = Arc::new(FakeSite::new(vec![(
            "/schedule/2024-01",
            Ok(page(&[("2024-01-01", "DAY")])),
        )]));
        let config = ScraperConfig {
            rate_interval: Duration::ZERO,
            success_policy: SuccessPolicy {
                min_success_ratio: 0.5,
            },
            ..Default::default()
        };
        let result = ScheduleScraper::new(site, Arc::new(TableExtractor::new()), config)
            .scrape_schedule(jan(), 3, &CancellationToken::new())
            .await;
        match result {
            Err(Error::InsufficientSuccess {
                succeeded,
                total,
                outcome,
                ..
            }) => {
                assert_eq!((succeeded, total), (1, 3));
                assert_eq!(outcome.records.len(), 1);
            }
            other => panic!("expected insufficient success, got {other:?}"),
        }
    }

    /// Blocks every fetch until cancelled
    struct HangingSite {
        started: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for HangingSite {
        async fn fetch_page(&self, _url: &str) -> std::result::Result<String, FetchError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            futures::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_cancel_before_any_success_is_error() {
        let site = Arc::new(HangingSite {
            started: AtomicUsize::new(0),
        });
        let scraper = ScheduleScraper::new(
            site,
            Arc::new(TableExtractor::new()),
            ScraperConfig {
                rate_interval: Duration::ZERO,
                ..Default::default()
            },
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = scraper.scrape_schedule(jan(), 3, &token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
