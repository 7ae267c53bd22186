//! Liquidation monitor entry point.
//!
//! Exit codes: 0 on a clean shutdown, 1 when startup fails after the
//! configuration was accepted, 2 when the configuration itself is bad.

use clap::Parser;
use liqmon_bot::{AppConfig, Application};
use std::process::ExitCode;
use tracing::{error, info};

/// Perpetual-futures liquidation monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (also settable via LIQMON_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Log every alert instead of delivering it to the configured webhook
    #[arg(long)]
    dry_run: bool,

    /// Delete the cached positions, then exit without running
    #[arg(long)]
    clear_cache: bool,

    /// Delete all persisted state except the wallet registry, then exit without running
    #[arg(long)]
    clear_db: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = liqmon_telemetry::init_logging() {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::from(2);
    }

    info!("starting liquidation monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(2);
        }
    };

    if args.clear_cache || args.clear_db {
        return run_clear(&config, args.clear_db).await;
    }

    let app = Application::new(config, args.dry_run);
    match app.run().await {
        Ok(()) => {
            info!("shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fatal error during startup or run");
            ExitCode::from(1)
        }
    }
}

async fn run_clear(config: &AppConfig, clear_db: bool) -> ExitCode {
    let store = match liqmon_persistence::PersistenceStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open database");
            return ExitCode::from(1);
        }
    };
    let result = if clear_db { store.clear_db().await } else { store.clear_cache().await };
    match result {
        Ok(()) => {
            info!(clear_db, "persisted state cleared");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to clear persisted state");
            ExitCode::from(1)
        }
    }
}
