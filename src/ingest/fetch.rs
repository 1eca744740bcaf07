// src/ingest/fetch.rs
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::{IngestError, Result};

/// Retrieves the raw body of one feed.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP fetcher with a per-request timeout. Non-2xx statuses are errors.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| IngestError::Fetch {
                url: String::new(),
                reason: format!("building http client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let fail = |reason: String| IngestError::Fetch {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("http status {status}")));
        }

        resp.text().await.map_err(|e| fail(format!("reading body: {e}")))
    }
}
