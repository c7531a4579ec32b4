use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use rota::config::Config;
use rota::crawler::ScheduleScraper;
use rota::models::Partition;
use rota::utils::{format_millis, truncate_text};

pub async fn scrape(
    config: &Config,
    start: &str,
    months: u32,
    json: bool,
    token: &CancellationToken,
) -> Result<()> {
    let start = Partition::parse(start)
        .with_context(|| format!("Invalid start month '{start}', expected YYYY-MM"))?;
    let scraper = ScheduleScraper::from_config(config).context("Failed to create scraper")?;

    println!("Scraping {months} month(s) from {}", config.fetcher.base_url);
    println!("========================");

    let outcome = scraper
        .scrape_schedule(start, months, token)
        .await
        .context("Scrape failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("\nScrape Summary");
    println!("  Months requested: {}", outcome.months_requested);
    println!("  Months processed: {}", outcome.months_processed);
    println!("  Months failed:    {}", outcome.months_failed);
    println!("  Records:          {}", outcome.records.len());
    println!("  Duplicates:       {}", outcome.duplicate_count);
    println!("  Elapsed:          {}", format_millis(u128::from(outcome.elapsed_ms)));
    if outcome.cancelled {
        println!("  (cancelled before all months finished)");
    }

    if outcome.has_errors() {
        println!("\nFailures:\n{}", outcome.formatted_errors());
    }
    if outcome.warning_count() > 0 {
        println!("\nWarnings:\n{}", outcome.formatted_warnings());
    }

    if !outcome.records.is_empty() {
        println!("\nFirst records:");
        for shift in outcome.records.iter().take(10) {
            println!(
                "  {} {:<5} {}",
                shift.date,
                shift.shift_type,
                truncate_text(shift.person.as_deref().unwrap_or("-"), 40)
            );
        }
    }

    Ok(())
}
