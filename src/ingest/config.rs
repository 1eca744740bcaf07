// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "INGEST_CONFIG_PATH";
const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_INTERVAL: &str = "INGEST_INTERVAL_SECS";
const ENV_OVERLAP: &str = "INGEST_OVERLAP";

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_CONCURRENT_FEEDS: usize = 4;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/news.db";
pub const DEFAULT_USER_AGENT: &str = concat!("news-ingest/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_FEEDS: &[&str] = &[
    "http://feeds.bbci.co.uk/news/rss.xml",
    "https://ir.thomsonreuters.com/rss/news-releases.xml?items=15",
    "https://ir.thomsonreuters.com/rss/events.xml?items=15",
    "https://www.dailymail.co.uk/articles.rss",
    "https://www.dailymail.co.uk/news/index.rss",
    "https://saharareporters.com/articles/rss-feed",
    "https://www.myjoyonline.com/feed/",
    "https://www.premiumtimesng.com/feed/",
    "https://mg.co.za/feed",
    "https://feeds.capi24.com/v1/Search/articles/news24/TopStories/rss",
    "https://www.herald.co.zw/feed/",
    "https://www.zimlive.com/feed/",
    "https://www.namibian.com.na/feed/",
    "https://www.lusakatimes.com/feed/",
    "https://www.mmegi.bw/rssFeed/1",
    "https://www.moroccoworldnews.com/feed/",
    "https://libyareview.com/feed/",
    "https://sudantribune.com/feed/",
    "https://www.journaldumali.com/feed/",
    "https://businessdayafrica.org/feed/",
    "https://disruptafrica.com/feed/",
    "https://techcabal.com/feed/",
    "https://www.howwemadeitinafrica.com/feed/",
    "https://brittlepaper.com/feed/",
    "https://www.channelstv.com/feed/",
    "https://africacheck.org/feed",
    "https://africanarguments.org/feed/",
];

/// What the scheduler does when a tick fires while a cycle is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the tick.
    #[default]
    Skip,
    /// Start another cycle anyway.
    Allow,
}

impl OverlapPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "allow" => Some(Self::Allow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub feeds: Vec<String>,
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_concurrent_feeds: usize,
    pub database_url: String,
    pub overlap: OverlapPolicy,
    /// Keep known links in memory between cycles instead of rescanning the store.
    pub cache_links: bool,
    pub user_agent: String,
    /// Optional JSON training file for the classifier; embedded seed otherwise.
    pub classifier_seed_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feeds: DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_concurrent_feeds: DEFAULT_MAX_CONCURRENT_FEEDS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            overlap: OverlapPolicy::Skip,
            cache_links: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            classifier_seed_path: None,
        }
    }
}

/// On-disk shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    feeds: Option<Vec<String>>,
    interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    max_concurrent_feeds: Option<usize>,
    database_url: Option<String>,
    overlap: Option<OverlapPolicy>,
    cache_links: Option<bool>,
    user_agent: Option<String>,
    classifier_seed_path: Option<PathBuf>,
}

impl RawConfig {
    fn into_config(self) -> IngestConfig {
        let d = IngestConfig::default();
        IngestConfig {
            feeds: self.feeds.map(clean_feeds).unwrap_or(d.feeds),
            interval_secs: self.interval_secs.unwrap_or(d.interval_secs).max(1),
            fetch_timeout_secs: self
                .fetch_timeout_secs
                .unwrap_or(d.fetch_timeout_secs)
                .max(1),
            max_concurrent_feeds: self
                .max_concurrent_feeds
                .unwrap_or(d.max_concurrent_feeds)
                .max(1),
            database_url: self
                .database_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(d.database_url),
            overlap: self.overlap.unwrap_or(d.overlap),
            cache_links: self.cache_links.unwrap_or(d.cache_links),
            user_agent: self.user_agent.unwrap_or(d.user_agent),
            classifier_seed_path: self.classifier_seed_path,
        }
    }
}

impl IngestConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let raw = match ext.as_str() {
            "json" => serde_json::from_str::<RawConfig>(&content)
                .with_context(|| format!("parsing {}", path.display()))?,
            _ => toml::from_str::<RawConfig>(&content)
                .with_context(|| format!("parsing {}", path.display()))?,
        };
        Ok(raw.into_config())
    }

    /// Load config using env var + fallbacks, then apply env overrides:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    /// 3) config/ingest.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("INGEST_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let toml_p = PathBuf::from("config/ingest.toml");
            let json_p = PathBuf::from("config/ingest.json");
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            if !url.trim().is_empty() {
                self.database_url = url;
            }
        }
        if let Ok(v) = std::env::var(ENV_INTERVAL) {
            let secs: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL} must be an integer, got {v:?}"))?;
            self.interval_secs = secs.max(1);
        }
        if let Ok(v) = std::env::var(ENV_OVERLAP) {
            self.overlap = OverlapPolicy::parse(&v)
                .ok_or_else(|| anyhow!("{ENV_OVERLAP} must be 'skip' or 'allow', got {v:?}"))?;
        }
        Ok(())
    }
}

/// Trim, drop empties, drop repeats (first occurrence wins). Order is kept.
fn clean_feeds(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
