//! Error taxonomy for the ingest pipeline.
//!
//! Every variant is scoped to the smallest unit it affects (one feed or one
//! article). The pipeline logs them and moves on; nothing here aborts a cycle.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Network or HTTP failure for one feed.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Feed body is not well-formed XML or lacks `rss/channel/item`.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Reading known links from the store failed.
    #[error("store query failed: {0}")]
    StoreQuery(String),

    /// Persisting one article failed.
    #[error("store insert failed for {link}: {reason}")]
    StoreInsert { link: String, reason: String },

    /// Store could not be opened or migrated.
    #[error("store unavailable: {0}")]
    Store(String),

    #[error("classification failed: {0}")]
    Classification(String),
}

impl IngestError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Fetch { .. } => "fetch",
            IngestError::Parse(_) => "parse",
            IngestError::StoreQuery(_) => "store_query",
            IngestError::StoreInsert { .. } => "store_insert",
            IngestError::Store(_) => "store",
            IngestError::Classification(_) => "classification",
        }
    }
}
