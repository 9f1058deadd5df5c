// src/error.rs
//! Failure values produced by the fetch/crawl path and by configuration loading.
//!
//! Source failures are data, not control flow: the crawler collects them and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Why one fetch attempt did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchErrorKind {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// 2xx, but the body's `status` field was not an accepted value.
    #[error("rejected response status `{0}`")]
    RejectedStatus(String),

    #[error("unreadable response body: {0}")]
    InvalidBody(String),
}

/// Final outcome of a Fetcher call that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("source `{alias}` ({id}) failed after {attempts} attempt(s): {cause}")]
pub struct FetchFailure {
    pub id: String,
    pub alias: String,
    pub attempts: u32,
    pub cause: FetchErrorKind,
}

/// One failed source within a crawl pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceFailure {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error("source `{alias}` ({id}) could not be parsed: {reason}")]
    Parse {
        id: String,
        alias: String,
        reason: String,
    },
}

impl SourceFailure {
    pub fn id(&self) -> &str {
        match self {
            SourceFailure::Fetch(f) => &f.id,
            SourceFailure::Parse { id, .. } => id,
        }
    }
}

/// Fatal startup errors. The pipeline cannot run without sources and keyword groups.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("invalid configuration in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failure_message_names_source() {
        let f = FetchFailure {
            id: "weibo".into(),
            alias: "Weibo".into(),
            attempts: 3,
            cause: FetchErrorKind::RejectedStatus("error".into()),
        };
        let msg = f.to_string();
        assert!(msg.contains("Weibo"));
        assert!(msg.contains("weibo"));
        assert!(msg.contains("3 attempt"));
        assert_eq!(SourceFailure::from(f).id(), "weibo");
    }
}
