// assay daemon
//
// Loads configuration, builds the storage, blob and queue adapters, and runs
// the result consumer pool (plus the stale-document reaper when enabled)
// until Ctrl-C. The queues are in-process: jobs stay queued until a broker
// transport drains them.

use assay_config::{AssayConfig, LogFormat, LoggingConfig};
use assay_daemon::Services;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit codes for different scenarios
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const STARTUP_ERROR: i32 = 2;
}

#[derive(Parser, Debug)]
#[command(name = "assay", version, about = "Document ingestion and graph reconciliation daemon")]
struct Args {
    /// TOML configuration file; ASSAY_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging is configured from the file, so config errors go to stderr
    let config = match AssayConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("assay: {}", e);
            process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    init_logging(&config.logging);
    info!("Starting assay daemon v{}", env!("CARGO_PKG_VERSION"));

    let services = match Services::build(&config) {
        Ok(services) => services,
        Err(e) => {
            error!("Failed to build services: {:#}", e);
            process::exit(exit_codes::STARTUP_ERROR);
        }
    };

    let stats = assay_daemon::run(&services, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await;

    info!(
        acked = stats.acked,
        retried = stats.retried,
        dead_lettered = stats.dead_lettered,
        unsettled = stats.unsettled,
        "assay daemon stopped"
    );
    process::exit(exit_codes::SUCCESS);
}

/// `RUST_LOG` wins over the configured level
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
