// src/analyze/mod.rs
//! Classification and frequency statistics over a crawl snapshot.

pub mod frequency;
pub mod matcher;

// Re-export convenient types.
pub use crate::analyze::frequency::{aggregate, Aggregation, GroupStat, MatchedTitle};
pub use crate::analyze::matcher::{KeywordGroup, KeywordGroups, CATCH_ALL_GROUP_KEY};
