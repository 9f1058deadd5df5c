// src/ingest/mod.rs
pub mod fetcher;
pub mod rss;
pub mod types;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FetchErrorKind, FetchFailure, SourceFailure};
use crate::ingest::fetcher::{Fetcher, HttpClient, RetryPolicy};
use crate::ingest::types::{record_title, CrawlResult, SourceSpec, TitleMap};

/// Lower bound for the gap between two source requests.
pub const MIN_PACING_MS: u64 = 50;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_sources_total", "Sources visited by the crawler.");
        describe_counter!(
            "crawl_source_failures_total",
            "Sources excluded from a snapshot after fetch or parse failure."
        );
        describe_counter!(
            "crawl_fetch_attempts_total",
            "HTTP attempts made against REST sources, retries included."
        );
        describe_counter!(
            "crawl_titles_total",
            "Distinct titles recorded across all sources."
        );
        describe_histogram!("crawl_fetch_ms", "Single fetch attempt time in milliseconds.");
    });
}

/// `max(50, interval + jitter)` where jitter is drawn from `-10..=20`.
pub fn pacing_delay_ms(interval_ms: u64, jitter_ms: i64) -> u64 {
    let base = i64::try_from(interval_ms).unwrap_or(i64::MAX);
    let delay = base.saturating_add(jitter_ms).max(MIN_PACING_MS as i64);
    delay as u64
}

fn jittered_pacing(interval_ms: u64) -> Duration {
    let jitter = rand::rng().random_range(-10..=20);
    Duration::from_millis(pacing_delay_ms(interval_ms, jitter))
}

#[derive(Debug, Deserialize)]
struct ApiPayload {
    #[serde(default)]
    items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default)]
    url: Option<serde_json::Value>,
    #[serde(default, rename = "mobileUrl")]
    mobile_url: Option<serde_json::Value>,
}

fn value_to_text(v: Option<&serde_json::Value>) -> String {
    match v {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Turns an aggregator body into a title map. Items with a blank title are
/// dropped; rank is the 1-based position in the returned list.
pub fn parse_rest_items(body: &str) -> Result<TitleMap, String> {
    let payload: ApiPayload = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let mut titles = TitleMap::new();
    for (index, item) in payload.items.iter().enumerate() {
        let title = value_to_text(item.title.as_ref());
        let title = title.trim();
        if title.is_empty() {
            continue;
        }
        let rank = u32::try_from(index + 1).unwrap_or(u32::MAX);
        record_title(
            &mut titles,
            title.to_string(),
            rank,
            &value_to_text(item.url.as_ref()),
            &value_to_text(item.mobile_url.as_ref()),
        );
    }
    Ok(titles)
}

/// Sequential, paced crawl over the configured sources.
pub struct Crawler {
    http: Arc<dyn HttpClient>,
    fetcher: Fetcher,
    max_retries: u32,
    rss_entry_limit: usize,
}

impl Crawler {
    pub fn new(
        http: Arc<dyn HttpClient>,
        endpoint: impl Into<String>,
        policy: RetryPolicy,
        max_retries: u32,
    ) -> Self {
        let fetcher = Fetcher::new(http.clone(), endpoint, policy);
        Self {
            http,
            fetcher,
            max_retries,
            rss_entry_limit: rss::RSS_ENTRY_LIMIT,
        }
    }

    pub fn with_rss_entry_limit(mut self, limit: usize) -> Self {
        self.rss_entry_limit = limit;
        self
    }

    /// Visits every source in order. Always returns; failures are collected.
    pub async fn crawl_all(&self, sources: &[SourceSpec], interval_ms: u64) -> CrawlResult {
        ensure_metrics_described();

        let mut result = CrawlResult::default();
        for (i, source) in sources.iter().enumerate() {
            counter!("crawl_sources_total").increment(1);

            let outcome = if source.is_rss() {
                self.crawl_rss(source).await
            } else {
                self.crawl_rest(source).await
            };

            match outcome {
                Ok(titles) => {
                    tracing::info!(
                        source = %source.id,
                        alias = %source.alias,
                        titles = titles.len(),
                        "source crawled"
                    );
                    counter!("crawl_titles_total").increment(titles.len() as u64);
                    result.snapshot.insert_source(source.id.clone(), titles);
                }
                Err(failure) => {
                    tracing::warn!(error = %failure, "source excluded from snapshot");
                    counter!("crawl_source_failures_total").increment(1);
                    result.push_failure(failure);
                }
            }

            if i + 1 < sources.len() {
                tokio::time::sleep(jittered_pacing(interval_ms)).await;
            }
        }

        tracing::info!(
            ok = result.snapshot.len(),
            failed = result.failed_ids.len(),
            titles = result.snapshot.total_titles(),
            "crawl finished"
        );
        result
    }

    async fn crawl_rest(&self, source: &SourceSpec) -> Result<TitleMap, SourceFailure> {
        let raw = self.fetcher.fetch(source, self.max_retries).await?;
        parse_rest_items(&raw.body).map_err(|reason| SourceFailure::Parse {
            id: source.id.clone(),
            alias: source.alias.clone(),
            reason,
        })
    }

    /// Single attempt; the feed URL is the source id.
    async fn crawl_rss(&self, source: &SourceSpec) -> Result<TitleMap, SourceFailure> {
        let fetch_failure = |cause: FetchErrorKind| FetchFailure {
            id: source.id.clone(),
            alias: source.alias.clone(),
            attempts: 1,
            cause,
        };

        let resp = self.http.get(&source.id).await.map_err(fetch_failure)?;
        if !resp.is_success() {
            return Err(fetch_failure(FetchErrorKind::HttpStatus(resp.status)).into());
        }

        let feed = rss::parse_feed(&resp.body, self.rss_entry_limit);
        if let Some(reason) = feed.error {
            if feed.entries.is_empty() {
                return Err(SourceFailure::Parse {
                    id: source.id.clone(),
                    alias: source.alias.clone(),
                    reason,
                });
            }
            tracing::warn!(
                source = %source.id,
                alias = %source.alias,
                kept = feed.entries.len(),
                %reason,
                "feed partially parsed, keeping complete entries"
            );
        }

        let mut titles = TitleMap::new();
        for (index, entry) in feed.entries.into_iter().enumerate() {
            let rank = u32::try_from(index + 1).unwrap_or(u32::MAX);
            record_title(&mut titles, entry.title, rank, &entry.link, &entry.link);
        }
        Ok(titles)
    }
}
