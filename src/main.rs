//! News ingest service: binary entrypoint.
//! Boots tracing, config, the article store and the ingest scheduler, then
//! serves the WebSocket push channel and diagnostics over Axum.

use anyhow::Context;
use news_ingest::ingest::scheduler::{spawn_scheduler, IngestSchedulerCfg};
use news_ingest::metrics::Metrics;
use news_ingest::{api, build_pipeline, init_tracing, Broadcaster, IngestConfig};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn serve() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default().context("loading ingest config")?;
    let metrics = Metrics::init(&cfg)?;

    let pipeline = build_pipeline(&cfg, Broadcaster::default()).await?;
    spawn_scheduler(IngestSchedulerCfg::from_config(&cfg), pipeline.clone());

    let router = api::router(api::AppState::new(pipeline)).merge(metrics.router());
    Ok(router.into())
}
