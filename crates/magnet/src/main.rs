//! AlertMagnet - Main Entry Point

use anyhow::Context;
use magnet::{init_logging, install_exporter, run, run_directory, MagnetConfig};
use query_engine::PrometheusClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::JsonLinesStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = MagnetConfig::load(config_path.as_deref()).context("loading configuration")?;
    config.validate().context("validating configuration")?;
    init_logging(&config.logging())?;

    info!("=== AlertMagnet v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(port) = config.prometheus_port {
        install_exporter(port)?;
    }

    let backend = Arc::new(PrometheusClient::new(
        &config.api_endpoint,
        config.timeout(),
        config.query_params(),
    )?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, stopping after in-flight queries");
                on_signal.cancel();
            }
            Err(e) => error!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    loop {
        let directory = run_directory(&config.directory_path);
        let store = Arc::new(JsonLinesStore::open(&directory)?);

        let report = run(config.clone(), backend.clone(), store, cancel.clone()).await?;
        info!("Results stored in {}", directory.display());
        for root in &report.analysis.reduction.roots {
            info!("Root alert: {}", root);
        }
        for (alert, cause) in &report.analysis.reduction.suppressible {
            info!("Suppressible: {} (caused by {})", alert, cause);
        }
        for gap in &report.gaps {
            warn!("Missing range {}: {}", gap.range, gap.cause);
        }

        if config.naptime_seconds == 0 || cancel.is_cancelled() {
            break;
        }
        info!("Next run in {}s", config.naptime_seconds);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(config.naptime_seconds)) => {}
        }
    }

    Ok(())
}
