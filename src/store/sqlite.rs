//! SQLite-backed article store.
//!
//! `link` carries a UNIQUE constraint; a conflicting insert is reported as
//! [`InsertOutcome::AlreadyPresent`] instead of an error.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{ArticleStore, InsertOutcome};
use crate::article::ArticleRecord;
use crate::error::{IngestError, Result};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Filesystem path behind a `sqlite:` URL, if it names one.
fn file_path(url: &str) -> Option<&Path> {
    if is_in_memory(url) {
        return None;
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty()).then(|| Path::new(path))
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        if let Some(parent) = file_path(url).and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    IngestError::Store(format!("failed to create database directory: {e}"))
                })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| IngestError::Store(format!("invalid database url: {e}")))?
            .create_if_missing(true);

        // An in-memory database lives and dies with its single connection.
        let pool_options = if is_in_memory(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| IngestError::Store(format!("failed to connect: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url, "article store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL,
                published TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                rendered_document TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("failed to create news_articles: {e}")))?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM news_articles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IngestError::StoreQuery(e.to_string()))
    }

    /// Category and rendered document stored for `link`.
    pub async fn find_by_link(&self, link: &str) -> Result<Option<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT category, rendered_document FROM news_articles WHERE link = ? LIMIT 1",
        )
        .bind(link)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::StoreQuery(e.to_string()))
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn list_links(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT link FROM news_articles")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IngestError::StoreQuery(e.to_string()))
    }

    async fn insert(&self, article: &ArticleRecord) -> Result<InsertOutcome> {
        let res = sqlx::query(
            r#"
            INSERT INTO news_articles
                (title, link, category, published, ingested_at, rendered_document)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(link) DO NOTHING
            "#,
        )
        .bind(&article.title)
        .bind(&article.link)
        .bind(&article.category)
        .bind(article.published.to_rfc3339())
        .bind(article.ingested_at.to_rfc3339())
        .bind(&article.rendered_document)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::StoreInsert {
            link: article.link.clone(),
            reason: e.to_string(),
        })?;

        if res.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyPresent)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_from_url() {
        assert_eq!(
            file_path("sqlite://data/news.db"),
            Some(Path::new("data/news.db"))
        );
        assert_eq!(
            file_path("sqlite:news.db?mode=rwc"),
            Some(Path::new("news.db"))
        );
        assert_eq!(file_path("sqlite::memory:"), None);
    }
}
