// src/ingest/types.rs
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SourceFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Aggregator endpoint keyed by an opaque id.
    Rest,
    /// Feed URL.
    Rss,
}

/// One configured source. The alias is always present (defaults to the id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub alias: String,
    pub kind: SourceKind,
}

impl SourceSpec {
    pub fn new(id: impl Into<String>, alias: Option<String>) -> Self {
        let id = id.into();
        let alias = alias
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| id.clone());
        let kind = if id.starts_with("http://") || id.starts_with("https://") {
            SourceKind::Rss
        } else {
            SourceKind::Rest
        };
        Self { id, alias, kind }
    }

    pub fn is_rss(&self) -> bool {
        self.kind == SourceKind::Rss
    }

    /// id -> alias lookup used when denormalizing matched titles.
    pub fn alias_map(sources: &[SourceSpec]) -> HashMap<String, String> {
        sources
            .iter()
            .map(|s| (s.id.clone(), s.alias.clone()))
            .collect()
    }
}

/// A title as seen within one source during one crawl pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    pub title: String,
    /// Every observed 1-based position, first-seen first. Never empty.
    pub ranks: Vec<u32>,
    pub url: String,
    #[serde(rename = "mobileUrl")]
    pub mobile_url: String,
}

impl RankedItem {
    pub fn best_rank(&self) -> Option<u32> {
        self.ranks.iter().copied().min()
    }
}

/// Titles of one source in first-seen order.
pub type TitleMap = IndexMap<String, RankedItem>;

/// Record one observation. An identical title appends its rank; the first
/// occurrence's urls are kept.
pub fn record_title(map: &mut TitleMap, title: String, rank: u32, url: &str, mobile_url: &str) {
    if let Some(existing) = map.get_mut(&title) {
        existing.ranks.push(rank);
        return;
    }
    map.insert(
        title.clone(),
        RankedItem {
            title,
            ranks: vec![rank],
            url: url.to_string(),
            mobile_url: mobile_url.to_string(),
        },
    );
}

/// Source id -> titles, in crawl order. Built fresh per crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    sources: IndexMap<String, TitleMap>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_source(&mut self, id: impl Into<String>, titles: TitleMap) {
        self.sources.insert(id.into(), titles);
    }

    pub fn get(&self, id: &str) -> Option<&TitleMap> {
        self.sources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TitleMap)> {
        self.sources.iter()
    }

    /// Number of sources that produced a title map.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Distinct titles per source, summed.
    pub fn total_titles(&self) -> usize {
        self.sources.values().map(|t| t.len()).sum()
    }
}

/// Output of one crawl pass.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub snapshot: Snapshot,
    /// Failed source ids in crawl order.
    pub failed_ids: Vec<String>,
    pub failures: Vec<SourceFailure>,
}

impl CrawlResult {
    pub(crate) fn push_failure(&mut self, failure: SourceFailure) {
        self.failed_ids.push(failure.id().to_string());
        self.failures.push(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_derived_from_id_shape() {
        assert_eq!(SourceSpec::new("weibo", None).kind, SourceKind::Rest);
        assert_eq!(
            SourceSpec::new("https://example.org/feed.xml", None).kind,
            SourceKind::Rss
        );
        assert_eq!(
            SourceSpec::new("http://example.org/rss", None).kind,
            SourceKind::Rss
        );
        assert_eq!(SourceSpec::new("httpbin", None).kind, SourceKind::Rest);
    }

    #[test]
    fn alias_defaults_to_id() {
        let s = SourceSpec::new("zhihu", None);
        assert_eq!(s.alias, "zhihu");
        let s = SourceSpec::new("zhihu", Some("  ".into()));
        assert_eq!(s.alias, "zhihu");
        let s = SourceSpec::new("zhihu", Some("Zhihu Hot".into()));
        assert_eq!(s.alias, "Zhihu Hot");
    }

    #[test]
    fn duplicate_titles_accumulate_ranks_in_order() {
        let mut m = TitleMap::new();
        record_title(&mut m, "a".into(), 1, "u1", "m1");
        record_title(&mut m, "b".into(), 2, "u2", "m2");
        record_title(&mut m, "a".into(), 3, "u3", "m3");
        record_title(&mut m, "a".into(), 7, "", "");

        let a = &m["a"];
        assert_eq!(a.ranks, vec![1, 3, 7]);
        assert_eq!(a.url, "u1");
        assert_eq!(a.mobile_url, "m1");
        assert_eq!(a.best_rank(), Some(1));
        assert_eq!(m.len(), 2);
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn total_titles_counts_distinct_per_source() {
        let mut a = TitleMap::new();
        record_title(&mut a, "x".into(), 1, "", "");
        record_title(&mut a, "x".into(), 2, "", "");
        let mut b = TitleMap::new();
        record_title(&mut b, "x".into(), 1, "", "");
        record_title(&mut b, "y".into(), 2, "", "");

        let mut snap = Snapshot::new();
        snap.insert_source("a", a);
        snap.insert_source("b", b);
        assert_eq!(snap.total_titles(), 3);
        assert_eq!(snap.len(), 2);
    }
}
