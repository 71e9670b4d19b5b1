use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use address_screen::cli::Cli;
use address_screen::config::Config;
use address_screen::errors::ScreenError;
use address_screen::input::read_addresses;
use address_screen::output::{default_output_path, write_results_to_path};
use address_screen::screening::{BatchSummary, Screener};

/// Main entry point for the application.
///
/// Reads addresses from the input CSV, screens them, and writes one row per
/// address. Ctrl-C cancels the batch without writing any output.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "address_screen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    cli.validate()?;

    let mut config = Config::from_env()?;
    if cli.exclude_indirect {
        config.include_indirect_exposure = false;
    }

    let output_file = cli
        .output_file
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input_file));

    tracing::info!(
        "Starting address screening: {} -> {}",
        cli.input_file.display(),
        output_file.display()
    );
    tracing::info!(
        "Rate limit: {} req/s, Max concurrent: {}",
        config.rate_limit,
        config.max_concurrent_requests
    );
    tracing::info!(
        "Include indirect exposure: {}",
        config.include_indirect_exposure
    );

    let addresses = read_addresses(&cli.input_file, &cli.address_column)?;
    if addresses.is_empty() {
        anyhow::bail!("No addresses found in input file");
    }
    tracing::info!("Found {} addresses to screen", addresses.len());

    let screener = Screener::new(&config)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let started_at = Utc::now();
    let results = match screener.screen_addresses_until(addresses, cancel).await {
        Ok(results) => results,
        Err(ScreenError::Cancelled) => {
            tracing::info!("Operation cancelled by user");
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };
    let summary = BatchSummary::new(&results, started_at, Utc::now());

    let taxonomy = screener.fetch_categories().await?;
    write_results_to_path(
        &output_file,
        &results,
        &taxonomy,
        screener.include_indirect(),
    )?;

    summary.log();

    Ok(())
}
