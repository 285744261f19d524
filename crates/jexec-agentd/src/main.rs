mod args;
mod files;
mod pump;
mod stdio;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use jexec_core::{EventHandler, policy::ImageFilter};
use jexec_kube::KubeConnector;
use jexec_observe::init_logger;
use jexec_prometheus::PrometheusMetrics;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    args::Args,
    files::FileConfigSource,
    pump::pump,
    stdio::{LineSink, LocalRegistry},
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1) logger
    init_logger(&args.logger_config())?;

    // 2) settings + allowlist
    let settings = Arc::new(args.job_settings()?);
    let images = Arc::new(ImageFilter::build(&args.allowed_images)?);

    // 3) metrics
    let metrics = Arc::new(PrometheusMetrics::new()?);

    // 4) handler
    let shutdown = CancellationToken::new();
    let handler = EventHandler::new(
        settings,
        images,
        Arc::new(FileConfigSource::new(&args.config_root)),
        Arc::new(KubeConnector),
        Arc::new(LineSink::stdout()),
    )
    .with_error_log(
        Arc::new(LocalRegistry::new(&args.integration_name)),
        &args.integration_name,
    )
    .with_metrics(metrics.clone())
    .with_shutdown(shutdown.clone());
    info!(config_root = %args.config_root.display(), "waiting for events on stdin");

    // 5) event loop, then drain
    let stats = pump(
        BufReader::new(tokio::io::stdin()),
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
        &shutdown,
        |event| {
            let handler = handler.clone();
            async move { handler.handle(&event).await }
        },
    )
    .await?;
    info!(?stats, "event input finished");

    if let Some(path) = &args.metrics_file {
        tokio::fs::write(path, metrics.encode_text()?)
            .await
            .with_context(|| format!("cannot write metrics to {}", path.display()))?;
    }
    Ok(())
}

