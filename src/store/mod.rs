//! Article store adapter.
//!
//! - [`memory`]: process-local store for tests and dry runs.
//! - [`sqlite`]: SQLite table with a UNIQUE `link` column.

use async_trait::async_trait;

use crate::article::ArticleRecord;
use crate::error::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of a successful insert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The store already had this link; nothing was written.
    AlreadyPresent,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Every link currently persisted.
    async fn list_links(&self) -> Result<Vec<String>>;

    async fn insert(&self, article: &ArticleRecord) -> Result<InsertOutcome>;

    fn name(&self) -> &'static str;
}
