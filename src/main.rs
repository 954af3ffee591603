use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

mod types;
mod config;
mod error;
mod placement;
mod prometheus;
mod snapshot;
mod sink;
mod collector;

use collector::CollectorLoop;
use config::load_config;
use placement::{CredentialSource, KubePlacementSource};
use prometheus::PrometheusSource;
use sink::LogSink;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!(
        backend = %cfg.metrics_backend_url,
        interval = ?cfg.poll_interval,
        "starting collector"
    );

    let credentials = CredentialSource::from_config(cfg.cluster_config_path.as_deref());
    let client = credentials.client().await?;

    let placements = KubePlacementSource::new(client);
    let metrics = PrometheusSource::new(&cfg.metrics_backend_url, cfg.query_timeout);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let mut collector = CollectorLoop::new(cfg, placements, metrics, LogSink);
    collector.run(shutdown_rx).await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
