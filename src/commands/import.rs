use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rota::config::Config;
use rota::coverage::CoverageResolver;
use rota::crawler::ScheduleScraper;
use rota::import::{DelimitedImporter, ScrapeImporter};
use rota::orchestrator::ImportOrchestrator;
use rota::storage::{SharedScheduleStore, SqliteStore};
use rota::utils::format_millis;
use rota::validation::ValidationResult;

pub async fn import(
    config: &Config,
    file: &Path,
    hospital_id: Uuid,
    user_id: Uuid,
    json: bool,
    token: &CancellationToken,
) -> Result<()> {
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read spreadsheet: {}", file.display()))?;

    let store: SharedScheduleStore = Arc::new(
        SqliteStore::new(&config.database.sqlite_path).context("Failed to open database")?,
    );
    let scraper = Arc::new(ScheduleScraper::from_config(config).context("Failed to create scraper")?);

    let orchestrator = ImportOrchestrator::new(
        Arc::new(DelimitedImporter::new(store.clone())),
        Arc::new(ScrapeImporter::new(scraper, store.clone())),
        Arc::new(CoverageResolver::new(store, config.coverage.clone())),
    );

    println!("Importing {}", file.display());
    println!("========================");

    let result = match orchestrator.execute(hospital_id, user_id, &content, token).await {
        Ok(result) => result,
        Err(e) => {
            if let Some(validation) = e.validation() {
                print_validation(validation, json)?;
            }
            return Err(e).context("Import failed");
        }
    };

    if let Some(artifact) = &result.artifact {
        println!("  Artifact:  {}", artifact.id);
        println!("  Period:    {}", artifact.period_id);
        println!(
            "  Months:    {} starting {}",
            artifact.month_count, artifact.start_month
        );
    }
    for phase in &result.phases {
        println!(
            "  {:<20} {:<10} {}",
            phase.phase.as_str(),
            phase.status.as_str(),
            format_millis(u128::from(phase.duration_ms))
        );
    }
    if let Some(coverage) = &result.coverage {
        println!("  {}", coverage.summary);
    }
    println!("  Reassigned: {}", result.reassigned_count());
    println!("  Total:      {}", format_millis(u128::from(result.duration_ms)));

    print_validation(&result.validation, json)
}

fn print_validation(validation: &ValidationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", validation.to_json()?);
        return Ok(());
    }

    println!("\nValidation: {}", validation.summary());
    for message in &validation.messages {
        println!("  {message}");
    }
    Ok(())
}
