//! Analyzer process entry point.
//!
//! Initializes models, exposes the control socket and waits for START
//! over it (or Ctrl-C to exit). Exits non-zero when initialization
//! fails.

use std::sync::Arc;

use anyhow::Context;
use fsift_analyzer::{AnalyzerApi, AnalyzerCommandHandler};
use fsift_proto::ControlServer;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).or_else(|| {
        std::env::var("FSIFT_ANALYZER_CONFIG").ok()
    });
    let settings = fsift_analyzer::settings::load(config_path.as_deref())
        .context("failed to load settings")?;

    let api = Arc::new(AnalyzerApi::with_defaults(settings.analyzer));
    if let Err(error) = api.initialize() {
        error!(%error, "Analyzer initialization failed");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler = Arc::new(AnalyzerCommandHandler::new(
        Arc::clone(&api),
        shutdown_tx.clone(),
    ));

    let server = ControlServer::bind(&settings.control_addr)
        .await
        .context("failed to bind control socket")?;

    tokio::select! {
        result = server.serve(handler, shutdown_rx) => {
            result.context("control server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    api.shutdown();
    info!("Analyzer exited cleanly");
    Ok(())
}
