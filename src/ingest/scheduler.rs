// src/ingest/scheduler.rs
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::config::{IngestConfig, OverlapPolicy};
use crate::ingest::{metric_names, IngestPipeline};

#[derive(Clone, Copy, Debug)]
pub struct IngestSchedulerCfg {
    pub period: Duration,
    pub overlap: OverlapPolicy,
}

impl IngestSchedulerCfg {
    pub fn from_config(cfg: &IngestConfig) -> Self {
        Self {
            period: Duration::from_secs(cfg.interval_secs.max(1)),
            overlap: cfg.overlap,
        }
    }
}

/// Clears the in-flight flag when a cycle task ends, however it ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawn the periodic trigger. The first cycle starts immediately.
///
/// Each cycle runs in its own task, so a slow cycle never delays the timer.
/// With [`OverlapPolicy::Skip`] a tick that fires while a cycle is still in
/// flight is dropped.
pub fn spawn_scheduler(cfg: IngestSchedulerCfg, pipeline: Arc<IngestPipeline>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let in_flight = Arc::new(AtomicBool::new(false));
        let mut ticker = tokio::time::interval(cfg.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            target: "ingest",
            period_ms = cfg.period.as_millis() as u64,
            overlap = ?cfg.overlap,
            feeds = pipeline.feeds().len(),
            "ingest scheduler started"
        );

        loop {
            ticker.tick().await;

            let flag = match cfg.overlap {
                OverlapPolicy::Skip => {
                    if in_flight.swap(true, Ordering::AcqRel) {
                        tracing::info!(target: "ingest", "previous cycle still running; tick skipped");
                        counter!(metric_names::CYCLES_SKIPPED).increment(1);
                        continue;
                    }
                    Some(InFlight(in_flight.clone()))
                }
                OverlapPolicy::Allow => None,
            };

            let p = pipeline.clone();
            tokio::spawn(async move {
                let _flag = flag;
                p.run_cycle().await;
            });
        }
    })
}
