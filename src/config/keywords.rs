// src/config/keywords.rs
//! Keyword-group file format.
//!
//! Blocks are separated by blank lines, one term per line:
//! `!term` is a global filter word, `+term` a required term of the block,
//! anything else a normal term. Blocks with no required or normal term are dropped.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::matcher::{KeywordGroup, KeywordGroups};
use crate::error::ConfigError;

pub const ENV_KEYWORDS_PATH: &str = "FREQUENCY_WORDS_PATH";
pub const DEFAULT_KEYWORDS_PATH: &str = "config/frequency_words.txt";

pub fn parse_keyword_groups(content: &str) -> KeywordGroups {
    let mut groups = Vec::new();
    let mut filter_words = Vec::new();
    let mut required = Vec::new();
    let mut normal = Vec::new();

    let mut close_block = |required: &mut Vec<String>, normal: &mut Vec<String>| {
        if let Some(g) = KeywordGroup::new(std::mem::take(required), std::mem::take(normal)) {
            groups.push(g);
        }
    };

    for line in content.lines() {
        let word = line.trim();
        if word.is_empty() {
            close_block(&mut required, &mut normal);
            continue;
        }
        if let Some(rest) = word.strip_prefix('!') {
            let rest = rest.trim();
            if !rest.is_empty() {
                filter_words.push(rest.to_string());
            }
        } else if let Some(rest) = word.strip_prefix('+') {
            let rest = rest.trim();
            if !rest.is_empty() {
                required.push(rest.to_string());
            }
        } else {
            normal.push(word.to_string());
        }
    }
    close_block(&mut required, &mut normal);

    KeywordGroups::new(groups, filter_words)
}

pub fn load_keyword_groups_from(path: &Path) -> Result<KeywordGroups> {
    if !path.exists() {
        return Err(ConfigError::Missing {
            path: path.to_path_buf(),
        }
        .into());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keyword groups from {}", path.display()))?;
    let groups = parse_keyword_groups(&content);
    tracing::info!(
        path = %path.display(),
        groups = groups.groups().len(),
        filter_words = groups.filter_words().len(),
        "keyword groups loaded"
    );
    Ok(groups)
}

/// Explicit path, else `$FREQUENCY_WORDS_PATH`, else `config/frequency_words.txt`.
pub fn resolve_keywords_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    std::env::var(ENV_KEYWORDS_PATH)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYWORDS_PATH))
}
