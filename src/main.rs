//! Health exporter
//!
//! Synthetic-monitoring agent built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                          SUPERVISOR                          │
//!   │                                                              │
//!   │  ┌────────────┐  tick   ┌────────────────┐   ┌────────────┐  │
//!   │  │ probe unit │────────▶│circuit breaker │──▶│  attempt   │──┼──▶ target
//!   │  │(per target)│         └────────────────┘   │http/dns/...│  │
//!   │  └────────────┘                              └─────┬──────┘  │
//!   │                                                    │         │
//!   │                              classify + record     ▼         │
//!   │  ┌────────────┐  render  ┌──────────────────────────────┐    │
//!   │  │ exposition │◀─────────│        metrics sink          │    │
//!   │  │  server    │          └──────────────────────────────┘    │
//!   │  └─────┬──────┘                                              │
//!   └────────┼─────────────────────────────────────────────────────┘
//!            ▼
//!       GET /metrics
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use health_exporter::config::load_config;
use health_exporter::lifecycle::signals::spawn_signal_handler;
use health_exporter::observability::logging::init_logging;
use health_exporter::{ExporterError, PrometheusSink, Shutdown, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "health-exporter", version, about = "Synthetic-monitoring health exporter")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the exposition listen address
    #[arg(long)]
    listen: Option<String>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "Exporter failed");
            eprintln!("health-exporter: {}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ExporterError> {
    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(error) => {
            init_logging(args.log_level.as_deref().unwrap_or("info"));
            return Err(error.into());
        }
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        listen = %config.server.listen,
        targets = config.targets.count(),
        "health-exporter starting"
    );

    let sink = Arc::new(PrometheusSink::new(&config.observability)?);
    let supervisor = Supervisor::from_config(&config, sink).await?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    supervisor.run(shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
