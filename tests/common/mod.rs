// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use news_ingest::error::{IngestError, Result};
use news_ingest::ingest::fetch::FeedFetcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const WORLD_XML: &str = include_str!("../fixtures/world_rss.xml");
pub const TECH_XML: &str = include_str!("../fixtures/tech_rss.xml");

pub const WORLD: &str = "https://world.example.test/rss";
pub const TECH: &str = "https://tech.example.test/rss";
pub const BROKEN: &str = "https://broken.example.test/rss";

/// Serves fixed bodies per URL; unknown URLs fail like a network error.
#[derive(Default)]
pub struct MapFetcher {
    bodies: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl MapFetcher {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let f = Self::default();
        for (url, body) in pairs {
            f.set(url, body);
        }
        f
    }

    pub fn set(&self, url: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn standard() -> Self {
        Self::new(&[(WORLD, WORLD_XML), (TECH, TECH_XML)])
    }
}

#[async_trait]
impl FeedFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::Fetch {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
    }
}

pub fn feeds(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|s| s.to_string()).collect()
}
