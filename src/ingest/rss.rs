// src/ingest/rss.rs
//! Streaming RSS 2.0 / RSS 1.0 / Atom entry extraction.
//!
//! Walks the document event by event so that a feed which breaks half way still
//! yields the entries that were complete before the error.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Entries taken per feed, in document order.
pub const RSS_ENTRY_LIMIT: usize = 15;

/// Title used for entries that carry none.
pub const UNTITLED_ENTRY: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    /// Set when the document was malformed or not a feed at all.
    pub error: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    link: String,
    link_is_alternate: bool,
}

impl EntryBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            // Atom links live in attributes; text links are RSS.
            Field::Link if !self.link_is_alternate => self.link.push_str(text),
            Field::Link => {}
        }
    }

    fn offer_href(&mut self, href: String, rel: Option<String>) {
        let alternate = matches!(rel.as_deref(), None | Some("alternate"));
        if alternate && !self.link_is_alternate {
            self.link = href;
            self.link_is_alternate = true;
        } else if self.link.is_empty() {
            self.link = href;
        }
    }

    fn finish(self) -> FeedEntry {
        let title = self.title.trim();
        FeedEntry {
            title: if title.is_empty() {
                UNTITLED_ENTRY.to_string()
            } else {
                title.to_string()
            },
            link: self.link.trim().to_string(),
        }
    }
}

/// Decodes XML and HTML entities (feeds routinely carry `&nbsp;` and friends).
fn decode_text(raw: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(raw);
    html_escape::decode_html_entities(&lossy).into_owned()
}

fn href_and_rel(e: &BytesStart<'_>) -> (Option<String>, Option<String>) {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(decode_text(&attr.value)),
            b"rel" => rel = Some(decode_text(&attr.value)),
            _ => {}
        }
    }
    (href, rel)
}

/// Extracts at most `limit` entries. Never fails; check [`ParsedFeed::error`].
pub fn parse_feed(xml: &str, limit: usize) -> ParsedFeed {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = ParsedFeed::default();
    let mut saw_root = false;
    let mut current: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;

    while out.entries.len() < limit {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"rss" | b"feed" | b"RDF" | b"channel" => saw_root = true,
                b"item" | b"entry" => {
                    saw_root = true;
                    current = Some(EntryBuilder::default());
                    field = None;
                }
                // Prefixed elements such as `media:title` are extensions, not the entry's own fields.
                _ if e.name().prefix().is_some() => {}
                b"title" if current.is_some() => field = Some(Field::Title),
                b"link" if current.is_some() => {
                    if let (Some(entry), (Some(href), rel)) = (current.as_mut(), href_and_rel(&e)) {
                        entry.offer_href(href, rel);
                    }
                    field = Some(Field::Link);
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"link" {
                    if let (Some(entry), (Some(href), rel)) = (current.as_mut(), href_and_rel(&e)) {
                        entry.offer_href(href, rel);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    entry.push_text(f, &decode_text(&t.into_inner()));
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    entry.push_text(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(entry) = current.take() {
                        out.entries.push(entry.finish());
                    }
                    field = None;
                }
                _ if e.name().prefix().is_some() => {}
                b"title" | b"link" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                out.error = Some(format!(
                    "malformed feed at byte {}: {e}",
                    reader.buffer_position()
                ));
                break;
            }
            _ => {}
        }
    }

    if out.error.is_none() && !saw_root {
        out.error = Some("document is not an RSS or Atom feed".to_string());
    }
    out
}
