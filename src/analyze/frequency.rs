// src/analyze/frequency.rs
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

use crate::analyze::matcher::KeywordGroups;
use crate::ingest::types::Snapshot;

/// A matched title joined with its source's alias. Built during aggregation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedTitle {
    pub title: String,
    pub source_name: String,
    pub ranks: Vec<u32>,
    pub url: String,
    pub mobile_url: String,
}

impl MatchedTitle {
    pub fn best_rank(&self) -> Option<u32> {
        self.ranks.iter().copied().min()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    /// The group key.
    pub word: String,
    pub count: usize,
    pub titles: Vec<MatchedTitle>,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    /// Count descending, configuration order among equal counts. Zero-count groups included.
    pub stats: Vec<GroupStat>,
    pub total_titles: usize,
}

impl Aggregation {
    pub fn matched_groups(&self) -> usize {
        self.stats.iter().filter(|s| s.count > 0).count()
    }
}

/// `round(count / total * 100, 2)`, zero when there are no titles.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = count as f64 / total as f64 * 100.0;
    // Halves go to the even neighbour: 3.125 -> 3.12.
    (pct * 100.0).round_ties_even() / 100.0
}

/// Classifies every (source, title) pair of the snapshot.
///
/// `groups` is used as given; callers substitute the catch-all group for an
/// empty configuration. Groups sharing a key report as one stat at the position
/// of the first of them. Unknown source ids fall back to the id as alias.
pub fn aggregate(
    snapshot: &Snapshot,
    groups: &KeywordGroups,
    alias_of: &HashMap<String, String>,
) -> Aggregation {
    let mut by_key: IndexMap<&str, GroupStat> = IndexMap::new();
    let slot_of: Vec<usize> = groups
        .groups()
        .iter()
        .map(|g| {
            let entry = by_key.entry(g.group_key.as_str());
            let slot = entry.index();
            entry.or_insert_with(|| GroupStat {
                word: g.group_key.clone(),
                count: 0,
                titles: Vec::new(),
                percentage: 0.0,
            });
            slot
        })
        .collect();
    let mut stats: Vec<GroupStat> = by_key.into_values().collect();

    let total_titles = snapshot.total_titles();

    for (source_id, titles) in snapshot.iter() {
        let source_name = alias_of
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| source_id.clone());

        for (title, item) in titles {
            let Some(idx) = groups.match_title(title) else {
                continue;
            };
            let stat = &mut stats[slot_of[idx]];
            stat.count += 1;
            stat.titles.push(MatchedTitle {
                title: title.clone(),
                source_name: source_name.clone(),
                ranks: item.ranks.clone(),
                url: item.url.clone(),
                mobile_url: item.mobile_url.clone(),
            });
        }
    }

    for stat in &mut stats {
        stat.percentage = percentage(stat.count, total_titles);
    }

    // Vec::sort_by is stable: equal counts keep configuration order.
    stats.sort_by(|a, b| b.count.cmp(&a.count));

    Aggregation {
        stats,
        total_titles,
    }
}
