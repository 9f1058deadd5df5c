// src/notify/mod.rs
//! Outbound notifications.
//!
//! One shared text [`Digest`] is built from the aggregation; every configured
//! channel renders and delivers it on its own. Channel failures are logged and
//! reported as outcomes, they never stop the other channels.

pub mod dingtalk;
pub mod email;
pub mod feishu;
pub mod push_record;
pub mod push_window;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::time::Duration;

use crate::analyze::{Aggregation, GroupStat};
use crate::config::NotificationConfig;

pub use push_record::{PushRecord, PushRecordStore};
pub use push_window::{GateState, PushWindowGate};

/// Titles listed per group in the shared digest.
pub const DIGEST_TITLES_PER_GROUP: usize = 5;

/// Bytes kept free in every batch for the `[batch i/n]` label.
const BATCH_LABEL_RESERVE: usize = 32;

static METRICS_DESCRIBED: OnceCell<()> = OnceCell::new();

pub fn ensure_metrics_described() {
    METRICS_DESCRIBED.get_or_init(|| {
        metrics::describe_counter!(
            "notify_batches_sent_total",
            "Webhook or email messages accepted by a channel"
        );
        metrics::describe_counter!(
            "notify_channel_failures_total",
            "Channel deliveries that failed"
        );
        metrics::describe_counter!(
            "push_records_purged_total",
            "Expired push-record files deleted by the retention sweep"
        );
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub text: String,
    pub report_type: String,
    pub generated_at: DateTime<FixedOffset>,
    /// Groups with at least one match, aggregation order.
    pub stats: Vec<GroupStat>,
    pub failed_ids: Vec<String>,
    pub total_titles: usize,
}

impl Digest {
    /// Short title used by channels that want one (DingTalk markdown, email subject).
    pub fn headline(&self) -> String {
        format!(
            "TrendRadar report - {} - {}",
            self.report_type,
            self.generated_at.format("%m-%d %H:%M")
        )
    }
}

/// `None` when no group matched and no source failed.
pub fn build_digest(
    agg: &Aggregation,
    failed_ids: &[String],
    report_type: &str,
    now: DateTime<FixedOffset>,
) -> Option<Digest> {
    let stats: Vec<GroupStat> = agg.stats.iter().filter(|s| s.count > 0).cloned().collect();
    if stats.is_empty() && failed_ids.is_empty() {
        return None;
    }

    let mut text = format!("📊 TrendRadar report {}\n\n", now.format("%H:%M"));
    for stat in &stats {
        text.push_str(&format!("🔥 {} ({})\n", stat.word, stat.count));
        for (i, t) in stat.titles.iter().take(DIGEST_TITLES_PER_GROUP).enumerate() {
            let rank = t.best_rank().map(|r| format!(" [{r}]")).unwrap_or_default();
            text.push_str(&format!("  {}. [{}] {}{}\n", i + 1, t.source_name, t.title, rank));
        }
        text.push('\n');
    }
    if !failed_ids.is_empty() {
        text.push_str(&format!("⚠️ Failed sources: {}\n", failed_ids.join(", ")));
    }

    Some(Digest {
        text,
        report_type: report_type.to_string(),
        generated_at: now,
        stats,
        failed_ids: failed_ids.to_vec(),
        total_titles: agg.total_titles,
    })
}

/// Splits on line boundaries so no batch exceeds `max_bytes`.
/// A single line longer than the limit is cut on char boundaries.
pub fn split_into_batches(text: &str, max_bytes: usize) -> Vec<String> {
    // room for at least one UTF-8 char
    let max_bytes = max_bytes.max(4);
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if needed <= max_bytes {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            continue;
        }

        if !current.is_empty() {
            batches.push(std::mem::take(&mut current));
        }
        let mut rest = line;
        while rest.len() > max_bytes {
            let mut cut = max_bytes;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            batches.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Batches for a size-limited channel, labelled `[batch i/n]` when there is more than one.
pub fn labelled_batches(text: &str, max_bytes: usize) -> Vec<String> {
    let raw = split_into_batches(text, max_bytes.saturating_sub(BATCH_LABEL_RESERVE));
    let n = raw.len();
    if n <= 1 {
        return raw;
    }
    raw.into_iter()
        .enumerate()
        .map(|(i, b)| format!("[batch {}/{}]\n{}", i + 1, n, b))
        .collect()
}

/// Vendor error carried in a 2xx webhook reply: non-zero `code`, `StatusCode` or `errcode`.
pub(crate) fn webhook_vendor_error(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["code", "StatusCode", "errcode"] {
        if let Some(code) = v.get(key).and_then(|c| c.as_i64()) {
            if code != 0 {
                let msg = ["msg", "StatusMessage", "errmsg"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(|m| m.as_str()))
                    .unwrap_or("");
                return Some(format!("{key}={code} {msg}").trim_end().to_string());
            }
        }
    }
    None
}

/// Posts JSON bodies in order, sleeping `interval` between them.
/// Stops at the first rejected batch.
pub(crate) async fn post_batches(
    client: &reqwest::Client,
    url: &str,
    channel: &'static str,
    bodies: Vec<serde_json::Value>,
    interval: Duration,
) -> Result<()> {
    let total = bodies.len();
    for (i, body) in bodies.into_iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        let resp = client
            .post(url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{channel} post batch {}/{total}", i + 1))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("{channel} batch {}/{total}: HTTP {status}", i + 1);
        }
        if let Some(err) = webhook_vendor_error(&text) {
            anyhow::bail!("{channel} batch {}/{total} rejected: {err}", i + 1);
        }
        metrics::counter!("notify_batches_sent_total", "channel" => channel).increment(1);
        tracing::debug!(channel, batch = i + 1, total, "batch sent");
    }
    Ok(())
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, digest: &Digest) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub outcome: DeliveryOutcome,
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered)
    }
}

/// Fan-out over the enabled channels.
#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every channel whose configuration is present.
    pub fn from_config(cfg: &NotificationConfig) -> Self {
        let hooks = &cfg.webhooks;
        let interval = Duration::from_secs_f64(cfg.batch_send_interval.max(0.0));
        let mut mux = Self::new();

        if !hooks.feishu_url.trim().is_empty() {
            match feishu::FeishuNotifier::new(hooks.feishu_url.trim(), cfg.feishu_batch_size, interval) {
                Ok(n) => mux.push(n),
                Err(e) => tracing::warn!(error = ?e, channel = "feishu", "channel disabled"),
            }
        }
        if !hooks.dingtalk_url.trim().is_empty() {
            match dingtalk::DingTalkNotifier::new(
                hooks.dingtalk_url.trim(),
                cfg.dingtalk_batch_size,
                interval,
            ) {
                Ok(n) => mux.push(n),
                Err(e) => tracing::warn!(error = ?e, channel = "dingtalk", "channel disabled"),
            }
        }
        if let Some(settings) = email::EmailSettings::from_webhooks(hooks) {
            match email::EmailNotifier::new(settings) {
                Ok(n) => mux.push(n),
                Err(e) => tracing::warn!(error = ?e, channel = "email", "channel disabled"),
            }
        } else if !hooks.email_from.is_empty() || !hooks.email_to.is_empty() {
            tracing::warn!("email configuration incomplete, email channel disabled");
        }
        mux
    }

    pub fn with_channel<N: Notifier + 'static>(mut self, n: N) -> Self {
        self.push(n);
        self
    }

    fn push<N: Notifier + 'static>(&mut self, n: N) {
        self.channels.push(Box::new(n));
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Tries every channel in order; never fails as a whole.
    pub async fn dispatch(&self, digest: &Digest) -> Vec<ChannelOutcome> {
        ensure_metrics_described();
        let mut outcomes = Vec::with_capacity(self.channels.len());
        for ch in &self.channels {
            let outcome = match ch.send(digest).await {
                Ok(()) => {
                    tracing::info!(channel = ch.name(), "notification delivered");
                    DeliveryOutcome::Delivered
                }
                Err(e) => {
                    metrics::counter!("notify_channel_failures_total", "channel" => ch.name())
                        .increment(1);
                    tracing::warn!(error = ?e, channel = ch.name(), "notification failed");
                    DeliveryOutcome::Failed(format!("{e:#}"))
                }
            };
            outcomes.push(ChannelOutcome {
                channel: ch.name().to_string(),
                outcome,
            });
        }
        outcomes
    }
}
