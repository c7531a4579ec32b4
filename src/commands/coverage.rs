use anyhow::{Context, Result};
use std::sync::Arc;
use uuid::Uuid;

use rota::config::Config;
use rota::coverage::CoverageResolver;
use rota::storage::SqliteStore;

pub async fn coverage(config: &Config, period_id: Uuid) -> Result<()> {
    let store = SqliteStore::new(&config.database.sqlite_path).context("Failed to open database")?;
    let resolver = CoverageResolver::new(Arc::new(store), config.coverage.clone());

    let report = resolver
        .resolve_period(period_id)
        .await
        .with_context(|| format!("Failed to resolve coverage for period {period_id}"))?;

    println!("Coverage for period {period_id}");
    println!("========================");
    println!("  Assignments: {}", report.decisions.len());
    println!("  Reassigned:  {}", report.reassigned_count());

    for detail in report.metrics.by_shift_type.values() {
        println!(
            "  {:<5} {:>3}/{:<3} {:>6.2}%  {}",
            detail.shift_type.as_str(),
            detail.assigned,
            detail.required,
            detail.percentage,
            detail.status.as_str()
        );
    }
    println!("\n{}", report.metrics.summary);

    for message in &report.validation.messages {
        println!("  {message}");
    }

    Ok(())
}
