// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{aggregate, GroupStat, KeywordGroups};
pub use crate::ingest::types::{CrawlResult, RankedItem, Snapshot, SourceSpec};
pub use crate::ingest::Crawler;
pub use crate::notify::{Digest, Notifier, NotifierMux};
pub use crate::pipeline::{DispatchOutcome, Pipeline, RunSummary};
