//! jaws server binary.
//!
//! ```text
//! CLI args → config (file + environment) → logging/metrics
//!     → Application::bind (listener, state, routes, middleware)
//!     → run until SIGINT/SIGTERM → drain → exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use jaws::config::ServerConfig;
use jaws::controllers::default_controllers;
use jaws::lifecycle::signals::spawn_signal_handler;
use jaws::lifecycle::Application;
use jaws::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "jaws", version, about = "HTTP/1.1 application server")]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "jaws=trace").
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ServerConfig::from_env_and_file(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("jaws: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "jaws starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = match Application::bind(config, &default_controllers()).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    spawn_signal_handler(app.shutdown());
    app.run().await;

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
