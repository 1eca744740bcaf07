// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod article;
pub mod broadcast;
pub mod classify;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod newsml;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::article::ArticleRecord;
pub use crate::broadcast::{Broadcaster, SubscriberRegistry};
pub use crate::error::IngestError;
pub use crate::ingest::config::IngestConfig;
pub use crate::ingest::{CycleReport, IngestPipeline};

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::classify::{Classifier, NaiveBayes};
use crate::ingest::fetch::HttpFetcher;
use crate::store::{ArticleStore, SqliteStore};

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG` (default `news_ingest=info,warn`); set
/// `LOG_FORMAT=json` for JSON lines. A no-op if a subscriber is already set
/// (e.g. by the deployment runtime).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_ingest=info,ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wire store, classifier and HTTP fetcher into a pipeline per `cfg`.
pub async fn build_pipeline(
    cfg: &IngestConfig,
    broadcaster: Broadcaster,
) -> anyhow::Result<Arc<IngestPipeline>> {
    let store: Arc<dyn ArticleStore> = Arc::new(
        SqliteStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("opening article store {}", cfg.database_url))?,
    );

    let classifier: Arc<dyn Classifier> = Arc::new(match &cfg.classifier_seed_path {
        Some(p) => NaiveBayes::load_from_file(p),
        None => NaiveBayes::from_seed(),
    });

    let fetcher = HttpFetcher::new(
        Duration::from_secs(cfg.fetch_timeout_secs),
        &cfg.user_agent,
    )
    .context("building feed fetcher")?;

    info!(
        feeds = cfg.feeds.len(),
        interval_secs = cfg.interval_secs,
        concurrency = cfg.max_concurrent_feeds,
        overlap = ?cfg.overlap,
        "ingest pipeline configured"
    );

    Ok(Arc::new(
        IngestPipeline::new(
            cfg.feeds.clone(),
            Arc::new(fetcher),
            classifier,
            store,
            broadcaster,
        )
        .with_concurrency(cfg.max_concurrent_feeds)
        .with_link_cache(cfg.cache_links),
    ))
}
