//! Link-based duplicate detection.
//!
//! The store is the source of truth. With caching enabled the known-link set
//! is loaded once and then kept current through [`DedupFilter::remember`],
//! which the pipeline calls after every insert (or conflict) it observes.
//! Without caching every check is a full scan of the store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

use crate::ingest::metric_names;
use crate::store::ArticleStore;

pub struct DedupFilter {
    store: Arc<dyn ArticleStore>,
    cache: Option<RwLock<Option<HashSet<String>>>>,
}

impl DedupFilter {
    pub fn new(store: Arc<dyn ArticleStore>, cache_links: bool) -> Self {
        Self {
            store,
            cache: cache_links.then(|| RwLock::new(None)),
        }
    }

    /// Whether `link` is already stored. A failed store read counts as
    /// "not a duplicate" so new content is never silently dropped.
    pub async fn is_duplicate(&self, link: &str) -> bool {
        let Some(cache) = &self.cache else {
            return self.scan(link).await.unwrap_or(false);
        };

        if let Some(set) = cache.read().await.as_ref() {
            return set.contains(link);
        }

        let mut guard = cache.write().await;
        if guard.is_none() {
            match self.store.list_links().await {
                Ok(links) => *guard = Some(links.into_iter().collect()),
                Err(e) => {
                    tracing::warn!(error = %e, link, "dedup lookup failed; treating as new");
                    metrics::counter!(metric_names::STORE_QUERY_ERRORS).increment(1);
                    return false;
                }
            }
        }
        guard.as_ref().is_some_and(|set| set.contains(link))
    }

    async fn scan(&self, link: &str) -> Option<bool> {
        match self.store.list_links().await {
            Ok(links) => Some(links.iter().any(|l| l == link)),
            Err(e) => {
                tracing::warn!(error = %e, link, "dedup lookup failed; treating as new");
                metrics::counter!(metric_names::STORE_QUERY_ERRORS).increment(1);
                None
            }
        }
    }

    /// Record that the store now holds `link`.
    pub async fn remember(&self, link: &str) {
        if let Some(cache) = &self.cache {
            if let Some(set) = cache.write().await.as_mut() {
                set.insert(link.to_string());
            }
        }
    }

    /// Drop the cached set; the next check reloads from the store.
    pub async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            *cache.write().await = None;
        }
    }
}

/// Per-link async mutexes. Entries are removed once no task holds or waits on them.
#[derive(Default)]
pub struct LinkLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct LinkGuard<'a> {
    locks: &'a LinkLocks,
    link: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LinkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, link: &str) -> LinkGuard<'_> {
        let m = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(link.to_string()).or_default().clone()
        };
        let guard = m.lock_owned().await;
        LinkGuard {
            locks: self,
            link: link.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of links currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LinkGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own handle left: nobody holds or waits.
        if map
            .get(&self.link)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            map.remove(&self.link);
        }
    }
}
