//! NewsML-G2 shaped document rendered for every stored article.
//!
//! All interpolated values are XML-escaped. `sentDate` carries the ingest
//! timestamp so the output depends only on the record fields.

use chrono::{DateTime, SecondsFormat, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{IngestError, Result};

pub const NEWSML_NS: &str = "http://iptc.org/std/nar/2006-10-01/";

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn render(
    title: &str,
    link: &str,
    category: &str,
    published: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
) -> String {
    let guid = encode_double_quoted_attribute(link);
    let link_text = encode_text(link);
    let title = encode_text(title);
    let category = encode_text(category);
    let ingested = iso(ingested_at);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<newsMessage xmlns="{NEWSML_NS}">
  <header>
    <sentDate>{ingested}</sentDate>
  </header>
  <newsItem guid="{guid}">
    <contentMeta>
      <title>{title}</title>
      <category>{category}</category>
      <pubDate>{published}</pubDate>
      <ingestDate>{ingested}</ingestDate>
    </contentMeta>
    <contentSet>
      <inlineXML>
        <body>
          <p>Read more at {link_text}</p>
        </body>
      </inlineXML>
    </contentSet>
  </newsItem>
</newsMessage>"#,
        published = iso(published),
    )
}

/// Fields recovered from a rendered document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsMlSummary {
    pub guid: String,
    pub title: String,
    pub category: String,
    pub pub_date: String,
    pub ingest_date: String,
    pub sent_date: String,
}

/// Read back the identifying fields of a document produced by [`render`].
pub fn read_summary(doc: &str) -> Result<NewsMlSummary> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().trim_text(true);

    let mut out = NewsMlSummary::default();
    let mut saw_root = false;
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if stack.is_empty() {
                    saw_root = name == "newsMessage";
                }
                if name == "newsItem" {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| IngestError::Parse(e.to_string()))?;
                        if attr.key.local_name().as_ref() == b"guid" {
                            out.guid = attr
                                .unescape_value()
                                .map_err(|e| IngestError::Parse(e.to_string()))?
                                .into_owned();
                        }
                    }
                }
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| IngestError::Parse(e.to_string()))?
                    .into_owned();
                let slot = match stack.last().map(String::as_str) {
                    Some("title") => &mut out.title,
                    Some("category") => &mut out.category,
                    Some("pubDate") => &mut out.pub_date,
                    Some("ingestDate") => &mut out.ingest_date,
                    Some("sentDate") => &mut out.sent_date,
                    _ => continue,
                };
                *slot = text;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IngestError::Parse(e.to_string())),
            _ => {}
        }
    }

    if !saw_root {
        return Err(IngestError::Parse("missing newsMessage root".into()));
    }
    Ok(out)
}
