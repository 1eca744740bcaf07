// src/store/memory.rs
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use super::{ArticleStore, InsertOutcome};
use crate::article::ArticleRecord;
use crate::error::{IngestError, Result};

/// In-memory store. Rejects a second insert of the same link the way the
/// SQLite UNIQUE constraint does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Vec<ArticleRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all stored records in insertion order.
    pub fn snapshot(&self) -> Vec<ArticleRecord> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn list_links(&self) -> Result<Vec<String>> {
        let v = self
            .inner
            .lock()
            .map_err(|_| IngestError::StoreQuery("memory store mutex poisoned".into()))?;
        Ok(v.iter().map(|a| a.link.clone()).collect())
    }

    async fn insert(&self, article: &ArticleRecord) -> Result<InsertOutcome> {
        let mut v = self.inner.lock().map_err(|_| IngestError::StoreInsert {
            link: article.link.clone(),
            reason: "memory store mutex poisoned".into(),
        })?;
        if v.iter().any(|a| a.link == article.link) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        v.push(article.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
