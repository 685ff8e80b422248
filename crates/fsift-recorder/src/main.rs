//! Recorder process entry point.
//!
//! Validates configuration, exposes the control socket and waits for
//! START_RECORDING over it (or Ctrl-C to exit). Exits non-zero when
//! initialization fails.

use std::sync::Arc;

use anyhow::Context;
use fsift_proto::ControlServer;
use fsift_recorder::{RecorderApi, RecorderCommandHandler};
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
        std::env::var("FSIFT_RECORDER_CONFIG").ok()
    });
    let settings = fsift_recorder::settings::load(config_path.as_deref())
        .context("failed to load settings")?;

    let api = Arc::new(RecorderApi::with_defaults(settings.recorder));
    if let Err(error) = api.initialize() {
        error!(%error, "Recorder initialization failed");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler = Arc::new(RecorderCommandHandler::new(
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
    info!("Recorder exited cleanly");
    Ok(())
}
