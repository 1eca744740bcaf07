// tests/scheduler.rs
mod common;

use async_trait::async_trait;
use common::{feeds, WORLD, WORLD_XML};
use news_ingest::classify::NaiveBayes;
use news_ingest::error::Result;
use news_ingest::ingest::config::OverlapPolicy;
use news_ingest::ingest::fetch::FeedFetcher;
use news_ingest::ingest::scheduler::{spawn_scheduler, IngestSchedulerCfg};
use news_ingest::store::MemoryStore;
use news_ingest::{Broadcaster, IngestPipeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Takes longer than one scheduler period and records peak concurrency.
#[derive(Default)]
struct SlowFetcher {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl FeedFetcher for SlowFetcher {
    async fn fetch(&self, _url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(WORLD_XML.to_string())
    }
}

async fn drive(overlap: OverlapPolicy) -> Arc<SlowFetcher> {
    let fetcher = Arc::new(SlowFetcher::default());
    let pipeline = Arc::new(IngestPipeline::new(
        feeds(&[WORLD]),
        fetcher.clone(),
        Arc::new(NaiveBayes::from_seed()),
        Arc::new(MemoryStore::new()),
        Broadcaster::default(),
    ));
    let handle = spawn_scheduler(
        IngestSchedulerCfg {
            period: Duration::from_millis(100),
            overlap,
        },
        pipeline,
    );
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    handle.abort();
    fetcher
}

#[tokio::test(start_paused = true)]
async fn skip_policy_never_overlaps_cycles() {
    let f = drive(OverlapPolicy::Skip).await;
    assert_eq!(f.peak.load(Ordering::SeqCst), 1);
    assert!(f.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn allow_policy_lets_cycles_overlap() {
    let f = drive(OverlapPolicy::Allow).await;
    assert!(f.peak.load(Ordering::SeqCst) >= 2);
    assert!(f.calls.load(Ordering::SeqCst) >= 5);
}

#[tokio::test(start_paused = true)]
async fn first_cycle_runs_without_waiting_a_period() {
    let fetcher = Arc::new(SlowFetcher::default());
    let pipeline = Arc::new(IngestPipeline::new(
        feeds(&[WORLD]),
        fetcher.clone(),
        Arc::new(NaiveBayes::from_seed()),
        Arc::new(MemoryStore::new()),
        Broadcaster::default(),
    ));
    let handle = spawn_scheduler(
        IngestSchedulerCfg {
            period: Duration::from_secs(30),
            overlap: OverlapPolicy::Skip,
        },
        pipeline.clone(),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.last_report().map(|r| r.inserted), Some(3));
    handle.abort();
}
