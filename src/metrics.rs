//! Prometheus exposition for the ingest service.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::ingest::config::IngestConfig;
use crate::ingest::metric_names;

/// Cycle wall-time buckets (ms); a cycle over 27 feeds sits in the seconds range.
const CYCLE_MS_BUCKETS: &[f64] = &[
    50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0,
];

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish static config gauges.
    /// Call once per process.
    pub fn init(cfg: &IngestConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(metric_names::CYCLE_MS.to_string()),
                CYCLE_MS_BUCKETS,
            )
            .context("prometheus: cycle buckets")?
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_gauge!("ingest_feeds_configured", "Feed URLs polled each cycle.");
        describe_gauge!("ingest_interval_secs", "Scheduler period in seconds.");
        describe_gauge!("broadcast_subscribers", "Live real-time subscribers.");
        describe_counter!(
            "broadcast_delivered_total",
            "Article messages accepted by subscribers."
        );

        gauge!("ingest_feeds_configured").set(cfg.feeds.len() as f64);
        gauge!("ingest_interval_secs").set(cfg.interval_secs as f64);

        Ok(Self { handle })
    }

    /// Router serving `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
