//! GEX Engine CLI
//!
//! `gex compute` prints one exposure bundle from quote documents on disk;
//! `gex run` keeps every ticker in the universe fresh until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use gex_engine::prelude::*;

#[derive(Parser)]
#[command(name = "gex", version, about = "Dealer Greek exposure from option-chain snapshots")]
struct Cli {
    /// JSON engine configuration; defaults apply when omitted
    #[arg(long, global = true, env = "GEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute exposure for one ticker and print a summary
    Compute {
        #[arg(long)]
        ticker: String,
        /// all, monthly, opex or 0dte
        #[arg(long, default_value = "all")]
        selector: ExpirationSelector,
        /// Directory holding <ticker>_quotedata.json documents
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Print the whole bundle as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refresh the configured universe on schedule
    Run {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(cfg!(debug_assertions))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> GexResult<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Compute {
            ticker,
            selector,
            data_dir,
            json,
        } => compute(config, Ticker::new(ticker), selector, data_dir, json).await,
        Command::Run { data_dir } => serve(config, data_dir).await,
    }
}

async fn compute(
    config: EngineConfig,
    ticker: Ticker,
    selector: ExpirationSelector,
    data_dir: PathBuf,
    json: bool,
) -> GexResult<()> {
    let loader = Arc::new(JsonFileLoader::new(data_dir));
    let service = ExposureService::new(config, loader.clone());

    let raw = match loader.load(&ticker).await? {
        LoadOutcome::Available(raw) => raw,
        LoadOutcome::Unavailable => return Err(GexError::unavailable(ticker.as_str())),
    };
    service.ingest(raw)?;

    let outcome = service.get_or_compute(&ticker, selector).await?;
    let Some(bundle) = outcome.bundle() else {
        return Err(GexError::unavailable(ticker.as_str()));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(bundle.as_ref())?);
        return Ok(());
    }

    println!("{} [{}] as of {}", bundle.ticker, bundle.selector, bundle.as_of_label);
    println!("  Spot: ${:.2}", bundle.spot);
    println!(
        "  Contracts: {} used, {} excluded, {} skipped",
        bundle.diagnostics.contracts_used,
        bundle.diagnostics.contracts_excluded,
        bundle.diagnostics.skipped.len()
    );
    println!();
    println!("  {:<7} {:>18} {:>12}  {:<10}", "Greek", "Net exposure", "Flip", "Regime");
    for greek in Greek::ALL {
        let regime = bundle
            .profile(greek, Cohort::All)
            .map(|p| p.regime())
            .unwrap_or(FlipRegime::Flat);
        let flip = bundle
            .flip(greek)
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:<7} {:>18.0} {:>12}  {:<10}",
            greek.label(),
            bundle.total(greek),
            flip,
            regime_label(&regime)
        );
    }
    Ok(())
}

fn regime_label(regime: &FlipRegime) -> &'static str {
    match regime {
        FlipRegime::Crossing { .. } => "crossing",
        FlipRegime::Negative => "negative",
        FlipRegime::Positive => "positive",
        FlipRegime::Flat => "flat",
    }
}

async fn serve(config: EngineConfig, data_dir: PathBuf) -> GexResult<()> {
    tracing::info!(
        "watching {} tickers in {}",
        config.universe.0.len(),
        data_dir.display()
    );
    let loader = Arc::new(JsonFileLoader::new(data_dir));
    let service = Arc::new(ExposureService::new(config, loader));
    let controller = FreshnessController::new(service);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
        }
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;
    Ok(())
}
