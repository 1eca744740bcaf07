//! Runs a single ingest cycle against the configured feeds and prints the report.
//! Handy for checking feed URLs and the store without starting the server.

use news_ingest::{build_pipeline, init_tracing, Broadcaster, IngestConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default()?;
    let pipeline = build_pipeline(&cfg, Broadcaster::default()).await?;
    let report = pipeline.run_cycle().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
