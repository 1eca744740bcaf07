// src/article.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::newsml;

pub const NO_TITLE: &str = "No title";
pub const NO_LINK: &str = "No link";
/// Feeds use this as a placeholder; it always triggers classification.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One `<item>` as extracted from a feed, before categorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
    pub category: Option<String>,
}

impl ParsedItem {
    /// True when the feed gave no usable category.
    pub fn needs_classification(&self) -> bool {
        match self.category.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(c) => c == UNCATEGORIZED,
        }
    }
}

/// Durable article. Also the JSON payload pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub link: String,
    pub category: String,
    pub published: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub rendered_document: String,
}

impl ArticleRecord {
    /// Build a record and render its NewsML document from the other fields.
    pub fn new(
        title: String,
        link: String,
        category: String,
        published: DateTime<Utc>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        let rendered_document = newsml::render(&title, &link, &category, published, ingested_at);
        Self {
            title,
            link,
            category,
            published,
            ingested_at,
            rendered_document,
        }
    }

    pub fn to_message(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(category: Option<&str>) -> ParsedItem {
        ParsedItem {
            title: "t".into(),
            link: "l".into(),
            published: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn classification_trigger() {
        assert!(item(None).needs_classification());
        assert!(item(Some("  ")).needs_classification());
        assert!(item(Some("Uncategorized")).needs_classification());
        assert!(!item(Some("World")).needs_classification());
    }

    #[test]
    fn message_carries_all_fields() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let rec = ArticleRecord::new(
            "Title".into(),
            "http://x/1".into(),
            "Sports".into(),
            ts,
            ts,
        );
        let v: serde_json::Value = serde_json::from_str(&rec.to_message().unwrap()).unwrap();
        for key in [
            "title",
            "link",
            "category",
            "published",
            "ingested_at",
            "rendered_document",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["published"], "2025-03-04T05:06:07Z");
    }
}
