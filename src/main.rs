use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rota::config::Config;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(
    name = "rota",
    version,
    about = "Staff schedule import: spreadsheet upload, external site scraping and coverage resolution",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML config file; ROTA_* environment variables are used when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch months from the external schedule site and print the outcome
    Scrape {
        /// First month, YYYY-MM
        #[arg(short, long)]
        start: String,

        /// Number of months to fetch
        #[arg(short, long, default_value = "1")]
        months: u32,

        /// Print the full outcome as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run the full three-phase import for a spreadsheet
    Import {
        /// Delimited spreadsheet (tab or comma separated)
        #[arg(short, long)]
        file: PathBuf,

        /// Hospital the schedule belongs to
        #[arg(long)]
        hospital: Uuid,

        /// User performing the import
        #[arg(long)]
        user: Uuid,

        /// Print the merged validation as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Recompute coverage for an already imported period
    Coverage {
        /// Period id of the schedule artifact
        #[arg(short, long)]
        period: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("rota starting");

    let token = CancellationToken::new();
    spawn_ctrl_c_handler(token.clone());

    match cli.command {
        Commands::Scrape {
            start,
            months,
            json,
        } => {
            tracing::info!(start = %start, months = %months, "Starting scrape command");
            commands::scrape(&config, &start, months, json, &token).await?;
        }

        Commands::Import {
            file,
            hospital,
            user,
            json,
        } => {
            tracing::info!(
                file = %file.display(),
                hospital = %hospital,
                user = %user,
                "Starting import command"
            );
            commands::import(&config, &file, hospital, user, json, &token).await?;
        }

        Commands::Coverage { period } => {
            tracing::info!(period = %period, "Starting coverage command");
            commands::coverage(&config, period).await?;
        }
    }

    tracing::info!("rota completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn spawn_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("rota=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("rota={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
