// src/ingest/mod.rs
//! Ingest pipeline: fetch → parse → categorize → dedupe → persist → notify.
//!
//! Every failure is contained to the feed or item it belongs to; a cycle
//! always runs to completion and reports its counts.

pub mod config;
pub mod dedup;
pub mod fetch;
pub mod parse;
pub mod scheduler;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::article::{ArticleRecord, ParsedItem, UNCATEGORIZED};
use crate::broadcast::Broadcaster;
use crate::classify::{Classifier, FALLBACK_CATEGORY};
use crate::error::IngestError;
use crate::store::{ArticleStore, InsertOutcome};
use dedup::{DedupFilter, LinkLocks};
use fetch::FeedFetcher;

pub use parse::{normalize_text, parse_feed};

pub mod metric_names {
    pub const CYCLES: &str = "ingest_cycles_total";
    pub const CYCLES_SKIPPED: &str = "ingest_cycles_skipped_total";
    pub const FEED_ERRORS: &str = "ingest_feed_errors_total";
    pub const ITEMS: &str = "ingest_items_total";
    pub const INSERTED: &str = "ingest_inserted_total";
    pub const DUPLICATES: &str = "ingest_duplicates_total";
    pub const INSERT_ERRORS: &str = "ingest_insert_errors_total";
    pub const STORE_QUERY_ERRORS: &str = "ingest_store_query_errors_total";
    pub const CLASSIFIED: &str = "ingest_classified_total";
    pub const CYCLE_MS: &str = "ingest_cycle_ms";
    pub const LAST_RUN_TS: &str = "ingest_last_run_ts";
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    use metric_names::*;
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(CYCLES, "Ingest cycles started.");
        describe_counter!(CYCLES_SKIPPED, "Ticks dropped because a cycle was still running.");
        describe_counter!(FEED_ERRORS, "Feeds skipped due to fetch/parse errors.");
        describe_counter!(ITEMS, "Items parsed from feeds.");
        describe_counter!(INSERTED, "Articles persisted.");
        describe_counter!(DUPLICATES, "Items skipped as already stored.");
        describe_counter!(INSERT_ERRORS, "Articles whose insert failed.");
        describe_counter!(STORE_QUERY_ERRORS, "Dedup lookups that failed.");
        describe_counter!(CLASSIFIED, "Items categorized by the classifier.");
        describe_histogram!(CYCLE_MS, "Cycle wall time in milliseconds.");
        describe_gauge!(LAST_RUN_TS, "Unix ts when the last cycle finished.");
    });
}

/// Counts for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub feeds_total: usize,
    pub feeds_failed: usize,
    pub items_seen: usize,
    pub classified: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub insert_failures: usize,
    /// Sum over inserted articles of subscribers that accepted the push.
    pub delivered: usize,
}

impl CycleReport {
    fn absorb(&mut self, t: FeedTally) {
        self.feeds_failed += usize::from(t.failed);
        self.items_seen += t.items_seen;
        self.classified += t.classified;
        self.inserted += t.inserted;
        self.duplicates += t.duplicates;
        self.insert_failures += t.insert_failures;
        self.delivered += t.delivered;
    }
}

#[derive(Debug, Default)]
struct FeedTally {
    failed: bool,
    items_seen: usize,
    classified: usize,
    inserted: usize,
    duplicates: usize,
    insert_failures: usize,
    delivered: usize,
}

impl FeedTally {
    fn failed() -> Self {
        Self {
            failed: true,
            ..Self::default()
        }
    }
}

pub struct IngestPipeline {
    feeds: Vec<String>,
    fetcher: Arc<dyn FeedFetcher>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn ArticleStore>,
    dedup: DedupFilter,
    broadcaster: Broadcaster,
    locks: LinkLocks,
    max_concurrent_feeds: usize,
    last_report: RwLock<Option<CycleReport>>,
}

impl IngestPipeline {
    /// Sequential feed processing with the known-link cache enabled.
    pub fn new(
        feeds: Vec<String>,
        fetcher: Arc<dyn FeedFetcher>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn ArticleStore>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            feeds,
            fetcher,
            classifier,
            dedup: DedupFilter::new(store.clone(), true),
            store,
            broadcaster,
            locks: LinkLocks::new(),
            max_concurrent_feeds: 1,
            last_report: RwLock::new(None),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent_feeds: usize) -> Self {
        self.max_concurrent_feeds = max_concurrent_feeds.max(1);
        self
    }

    pub fn with_link_cache(mut self, enabled: bool) -> Self {
        self.dedup = DedupFilter::new(self.store.clone(), enabled);
        self
    }

    pub fn feeds(&self) -> &[String] {
        &self.feeds
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
            .read()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Run one full pass over all feeds.
    pub async fn run_cycle(&self) -> CycleReport {
        ensure_metrics_described();
        counter!(metric_names::CYCLES).increment(1);

        let t0 = Instant::now();
        let mut report = CycleReport {
            started_at: Some(Utc::now()),
            feeds_total: self.feeds.len(),
            ..CycleReport::default()
        };

        let tallies: Vec<FeedTally> = stream::iter(self.feeds.clone())
            .map(|url| async move { self.process_feed(&url).await })
            .buffer_unordered(self.max_concurrent_feeds)
            .collect()
            .await;
        for t in tallies {
            report.absorb(t);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!(metric_names::CYCLE_MS).record(ms);
        gauge!(metric_names::LAST_RUN_TS).set(Utc::now().timestamp() as f64);

        tracing::info!(
            target: "ingest",
            feeds = report.feeds_total,
            feeds_failed = report.feeds_failed,
            items = report.items_seen,
            inserted = report.inserted,
            duplicates = report.duplicates,
            insert_failures = report.insert_failures,
            elapsed_ms = ms as u64,
            "ingest cycle finished"
        );

        if let Ok(mut g) = self.last_report.write() {
            *g = Some(report.clone());
        }
        report
    }

    async fn process_feed(&self, url: &str) -> FeedTally {
        tracing::debug!(feed = url, "fetching feed");

        let body = match self.fetcher.fetch(url).await {
            Ok(b) => b,
            Err(e) => return self.feed_failed(url, e),
        };
        let items = match parse_feed(&body, Utc::now()) {
            Ok(v) => v,
            Err(e) => return self.feed_failed(url, e),
        };

        counter!(metric_names::ITEMS).increment(items.len() as u64);
        let mut tally = FeedTally {
            items_seen: items.len(),
            ..FeedTally::default()
        };
        for item in items {
            self.process_item(url, item, &mut tally).await;
        }
        tally
    }

    fn feed_failed(&self, url: &str, e: IngestError) -> FeedTally {
        tracing::warn!(feed = url, kind = e.kind(), error = %e, "feed skipped this cycle");
        counter!(metric_names::FEED_ERRORS, "kind" => e.kind()).increment(1);
        FeedTally::failed()
    }

    /// Feed category verbatim, or the classifier's pick for the title.
    fn categorize(&self, item: &ParsedItem, tally: &mut FeedTally) -> String {
        if !item.needs_classification() {
            if let Some(c) = &item.category {
                return c.clone();
            }
        }

        tally.classified += 1;
        counter!(metric_names::CLASSIFIED).increment(1);
        match self.classifier.classify(&item.title) {
            Ok(c) if !c.trim().is_empty() && c != UNCATEGORIZED => {
                tracing::debug!(title = %item.title, category = %c, "predicted category");
                c
            }
            Ok(c) => {
                tracing::warn!(title = %item.title, got = %c, "classifier returned unusable category");
                FALLBACK_CATEGORY.to_string()
            }
            Err(e) => {
                tracing::warn!(title = %item.title, error = %e, "classification failed");
                FALLBACK_CATEGORY.to_string()
            }
        }
    }

    async fn process_item(&self, feed: &str, item: ParsedItem, tally: &mut FeedTally) {
        let category = self.categorize(&item, tally);

        // Check-then-insert for one link never interleaves across feeds.
        let guard = self.locks.acquire(&item.link).await;

        if self.dedup.is_duplicate(&item.link).await {
            tracing::debug!(feed, link = %item.link, "skipped duplicate");
            counter!(metric_names::DUPLICATES).increment(1);
            tally.duplicates += 1;
            return;
        }

        let record = ArticleRecord::new(
            item.title,
            item.link,
            category,
            item.published,
            Utc::now(),
        );

        match self.store.insert(&record).await {
            Ok(InsertOutcome::Inserted) => {
                self.dedup.remember(&record.link).await;
                drop(guard);
                tracing::info!(
                    feed,
                    title = %record.title,
                    category = %record.category,
                    "inserted article"
                );
                counter!(metric_names::INSERTED).increment(1);
                tally.inserted += 1;
                tally.delivered += self.broadcaster.publish(&record);
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                self.dedup.remember(&record.link).await;
                tracing::debug!(feed, link = %record.link, "store already had link");
                counter!(metric_names::DUPLICATES).increment(1);
                tally.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(feed, title = %record.title, error = %e, "insert failed; article skipped");
                counter!(metric_names::INSERT_ERRORS).increment(1);
                tally.insert_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::NaiveBayes;
    use crate::error::Result;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct OneFeed(&'static str);

    #[async_trait]
    impl FeedFetcher for OneFeed {
        async fn fetch(&self, _url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn classify(&self, _text: &str) -> Result<String> {
            Err(IngestError::Classification("model missing".into()))
        }
    }

    const XML: &str = "<rss><channel>\
        <item><title>Stock market crashes</title><link>http://x/1</link></item>\
        <item><title>Local derby</title><link>http://x/2</link><category>Sports</category></item>\
        </channel></rss>";

    #[tokio::test]
    async fn report_counts_and_last_report() {
        let store = Arc::new(MemoryStore::new());
        let p = IngestPipeline::new(
            vec!["http://feed/a".into()],
            Arc::new(OneFeed(XML)),
            Arc::new(NaiveBayes::from_seed()),
            store.clone(),
            Broadcaster::default(),
        );
        assert!(p.last_report().is_none());
        let r = p.run_cycle().await;
        assert_eq!(r.items_seen, 2);
        assert_eq!(r.inserted, 2);
        assert_eq!(r.classified, 1);
        assert_eq!(p.last_report(), Some(r));
    }

    #[tokio::test]
    async fn cycle_runs_as_a_spawned_task() {
        let store = Arc::new(MemoryStore::new());
        let p = Arc::new(IngestPipeline::new(
            vec!["http://feed/a".into(), "http://feed/b".into()],
            Arc::new(OneFeed(XML)),
            Arc::new(NaiveBayes::from_seed()),
            store.clone(),
            Broadcaster::default(),
        ));
        let task = tokio::spawn({
            let p = p.clone();
            async move { p.run_cycle().await }
        });
        let r = task.await.unwrap();
        assert_eq!(r.feeds_total, 2);
        assert_eq!(r.inserted, 2);
        assert_eq!(r.duplicates, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn classifier_failure_stores_fallback_category() {
        let store = Arc::new(MemoryStore::new());
        let p = IngestPipeline::new(
            vec!["http://feed/a".into()],
            Arc::new(OneFeed(XML)),
            Arc::new(BrokenClassifier),
            store.clone(),
            Broadcaster::default(),
        );
        p.run_cycle().await;
        let rows = store.snapshot();
        assert_eq!(rows[0].category, FALLBACK_CATEGORY);
        assert_eq!(rows[1].category, "Sports");
    }
}
