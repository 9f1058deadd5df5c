// src/pipeline.rs
//! One complete run: crawl, aggregate, gate, dispatch, record.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::analyze::{aggregate, Aggregation, KeywordGroups};
use crate::clock::beijing_now;
use crate::config::AppConfig;
use crate::ingest::fetcher::{HttpClient, ReqwestClient, RetryPolicy};
use crate::ingest::types::SourceSpec;
use crate::ingest::Crawler;
use crate::notify::{build_digest, ChannelOutcome, GateState, NotifierMux, PushWindowGate};

/// What happened to the notification step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    CrawlerDisabled,
    NotificationsDisabled,
    /// No group matched and no source failed.
    NothingToSend,
    Gated { state: GateState },
    NoChannels,
    Dispatched {
        channels: Vec<ChannelOutcome>,
        recorded: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<FixedOffset>,
    pub sources: usize,
    pub failed_ids: Vec<String>,
    pub total_titles: usize,
    pub matched_groups: usize,
    /// `(group key, count)` for groups with matches, display order.
    pub group_counts: Vec<(String, usize)>,
    pub dispatch: DispatchOutcome,
}

impl RunSummary {
    fn empty(started_at: DateTime<FixedOffset>, dispatch: DispatchOutcome) -> Self {
        Self {
            started_at,
            sources: 0,
            failed_ids: Vec::new(),
            total_titles: 0,
            matched_groups: 0,
            group_counts: Vec::new(),
            dispatch,
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

pub struct Pipeline {
    cfg: AppConfig,
    sources: Vec<SourceSpec>,
    groups: KeywordGroups,
    crawler: Crawler,
    notifiers: NotifierMux,
    records_dir: PathBuf,
    clock: Clock,
}

impl Pipeline {
    /// `groups` may be empty; the catch-all group is substituted here.
    pub fn new(
        cfg: AppConfig,
        groups: KeywordGroups,
        crawler: Crawler,
        notifiers: NotifierMux,
        records_dir: impl Into<PathBuf>,
    ) -> Self {
        let sources = cfg.sources();
        Self {
            cfg,
            sources,
            groups: groups.with_catch_all_if_empty(),
            crawler,
            notifiers,
            records_dir: records_dir.into(),
            clock: Box::new(beijing_now),
        }
    }

    /// Production wiring: reqwest client (proxy aware), default retry policy,
    /// every configured notification channel.
    pub fn from_config(cfg: AppConfig, groups: KeywordGroups, records_dir: impl Into<PathBuf>) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.crawler.request_timeout_secs.max(1));
        let http: Arc<dyn HttpClient> = Arc::new(
            ReqwestClient::new(timeout, cfg.proxy()).context("building source http client")?,
        );
        let crawler = Crawler::new(
            http,
            cfg.crawler.api_endpoint.clone(),
            RetryPolicy::default(),
            cfg.crawler.max_retries,
        );
        let notifiers = NotifierMux::from_config(&cfg.notification);
        if cfg.notification.enable_notification {
            tracing::info!(channels = ?notifiers.channel_names(), "notification channels");
        }
        Ok(Self::new(cfg, groups, crawler, notifiers, records_dir))
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<FixedOffset> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn groups(&self) -> &KeywordGroups {
        &self.groups
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = (self.clock)();
        tracing::info!(
            at = %started_at.format("%Y-%m-%d %H:%M:%S"),
            mode = %self.cfg.report.mode,
            "run started"
        );

        if !self.cfg.crawler.enable_crawler {
            tracing::warn!("crawler disabled, nothing to do");
            return Ok(RunSummary::empty(started_at, DispatchOutcome::CrawlerDisabled));
        }

        let crawl = self
            .crawler
            .crawl_all(&self.sources, self.cfg.crawler.request_interval)
            .await;

        let alias_of = SourceSpec::alias_map(&self.sources);
        let agg = aggregate(&crawl.snapshot, &self.groups, &alias_of);
        log_aggregation(&agg);

        let dispatch = self.notify(&agg, &crawl.failed_ids).await?;

        Ok(RunSummary {
            started_at,
            sources: self.sources.len(),
            failed_ids: crawl.failed_ids,
            total_titles: agg.total_titles,
            matched_groups: agg.matched_groups(),
            group_counts: agg
                .stats
                .iter()
                .filter(|s| s.count > 0)
                .map(|s| (s.word.clone(), s.count))
                .collect(),
            dispatch,
        })
    }

    async fn notify(&self, agg: &Aggregation, failed_ids: &[String]) -> Result<DispatchOutcome> {
        let ncfg = &self.cfg.notification;
        if !ncfg.enable_notification {
            tracing::info!("notifications disabled");
            return Ok(DispatchOutcome::NotificationsDisabled);
        }

        let now = (self.clock)();
        let report_type = self.cfg.report.mode.as_str();
        let Some(digest) = build_digest(agg, failed_ids, report_type, now) else {
            tracing::info!("no matched titles and no failed sources, skipping notifications");
            return Ok(DispatchOutcome::NothingToSend);
        };

        let gate = PushWindowGate::new(&ncfg.push_window, &self.records_dir, now)
            .context("opening push window gate")?;
        let state = gate.check(now);
        if state != GateState::Open {
            return Ok(DispatchOutcome::Gated { state });
        }

        if self.notifiers.is_empty() {
            tracing::warn!("no notification channel configured");
            return Ok(DispatchOutcome::NoChannels);
        }

        let channels = self.notifiers.dispatch(&digest).await;
        let delivered = channels.iter().filter(|c| c.is_delivered()).count();
        tracing::info!(delivered, attempted = channels.len(), "dispatch finished");

        let recorded = if gate.records_pushes() {
            match gate.record(now, report_type) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = ?e, "failed to write push record");
                    false
                }
            }
        } else {
            false
        };

        Ok(DispatchOutcome::Dispatched { channels, recorded })
    }
}

fn log_aggregation(agg: &Aggregation) {
    tracing::info!(
        total_titles = agg.total_titles,
        matched_groups = agg.matched_groups(),
        "aggregation finished"
    );
    for s in agg.stats.iter().filter(|s| s.count > 0) {
        tracing::info!(group = %s.word, count = s.count, percentage = s.percentage, "group");
    }
}
