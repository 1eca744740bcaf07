//! RSS 2.0 item extraction.
//!
//! Walks `rss/channel/item` with a streaming reader and keeps the first
//! occurrence of each field. Escaped text is unescaped exactly once, falling
//! back to HTML entity decoding for entities XML does not know (`&nbsp;` is
//! common in real feeds). CDATA payloads are treated as HTML fragments: tags
//! are stripped before their entities are decoded. Whitespace is collapsed,
//! except in categories, which are only trimmed.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::article::{ParsedItem, NO_LINK, NO_TITLE};
use crate::error::{IngestError, Result};

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Plain text of an HTML fragment: strip tags, decode entities once,
/// collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    collapse_ws(&fragment_text(s))
}

fn fragment_text(s: &str) -> String {
    let stripped = RE_TAGS.replace_all(s, "");
    html_escape::decode_html_entities(&stripped).into_owned()
}

fn collapse_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

/// Parse an RFC 2822 or RFC 3339 date.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let from_time = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok()
        .and_then(|dt| {
            Utc.timestamp_opt(dt.unix_timestamp(), dt.nanosecond())
                .single()
        });
    // chrono is more lenient with legacy zone names ("EST", "UT")
    from_time.or_else(|| {
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Category,
    PubDate,
    DcDate,
    Published,
    Updated,
}

impl Field {
    fn from_qname(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"category" => Some(Self::Category),
            b"pubDate" => Some(Self::PubDate),
            b"dc:date" => Some(Self::DcDate),
            b"published" => Some(Self::Published),
            b"updated" => Some(Self::Updated),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    category: Option<String>,
    pub_date: Option<String>,
    dc_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
}

impl RawItem {
    fn slot(&mut self, f: Field) -> &mut Option<String> {
        match f {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Category => &mut self.category,
            Field::PubDate => &mut self.pub_date,
            Field::DcDate => &mut self.dc_date,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
        }
    }

    fn into_parsed(self, now: DateTime<Utc>) -> ParsedItem {
        let raw_date = self
            .pub_date
            .or(self.dc_date)
            .or(self.published)
            .or(self.updated);
        ParsedItem {
            title: self.title.unwrap_or_else(|| NO_TITLE.to_string()),
            link: self.link.unwrap_or_else(|| NO_LINK.to_string()),
            published: raw_date.as_deref().and_then(parse_date).unwrap_or(now),
            category: self.category,
        }
    }
}

fn perr(msg: impl Into<String>) -> IngestError {
    IngestError::Parse(msg.into())
}

/// Extract items in document order. `now` stands in for missing or bad dates.
pub fn parse_feed(body: &str, now: DateTime<Utc>) -> Result<Vec<ParsedItem>> {
    let mut reader = Reader::from_str(body);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut saw_channel = false;
    let mut items: Vec<RawItem> = Vec::new();
    let mut item: Option<RawItem> = None;
    let mut field: Option<(Field, String)> = None;

    loop {
        let ev = reader
            .read_event()
            .map_err(|e| perr(format!("xml error at {}: {e}", reader.buffer_position())))?;
        match ev {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match stack.len() {
                    0 if name != b"rss" => return Err(perr("root element is not <rss>")),
                    1 if name == b"channel" => saw_channel = true,
                    2 if name == b"item" && stack[1] == b"channel" => {
                        item = Some(RawItem::default())
                    }
                    3 if item.is_some() => {
                        field = Field::from_qname(&name).map(|f| (f, String::new()));
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = e.name();
                match stack.len() {
                    0 => return Err(perr("root element is empty")),
                    1 if name.as_ref() == b"channel" => saw_channel = true,
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = field.as_mut() {
                    match t.unescape() {
                        Ok(text) => buf.push_str(&text),
                        Err(_) => buf.push_str(&html_escape::decode_html_entities(
                            &String::from_utf8_lossy(&t),
                        )),
                    }
                }
            }
            Event::CData(c) => {
                if let Some((_, buf)) = field.as_mut() {
                    buf.push_str(&fragment_text(&String::from_utf8_lossy(&c)));
                }
            }
            Event::End(_) => {
                let depth = stack.len();
                stack.pop();
                if depth == 4 {
                    if let (Some((f, buf)), Some(it)) = (field.take(), item.as_mut()) {
                        let text = match f {
                            Field::Category => buf.trim().to_string(),
                            _ => collapse_ws(&buf),
                        };
                        let slot = it.slot(f);
                        if slot.is_none() && !text.is_empty() {
                            *slot = Some(text);
                        }
                    }
                } else if depth == 3 {
                    if let Some(it) = item.take() {
                        items.push(it);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(perr("truncated document"));
    }
    if !saw_channel {
        return Err(perr("missing rss/channel"));
    }
    if items.is_empty() {
        return Err(perr("channel has no items"));
    }

    Ok(items.into_iter().map(|it| it.into_parsed(now)).collect())
}
