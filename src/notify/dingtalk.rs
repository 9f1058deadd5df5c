// src/notify/dingtalk.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{labelled_batches, post_batches, Digest, Notifier};

pub const DINGTALK_TIMEOUT: Duration = Duration::from_secs(10);

/// DingTalk robot webhook. The digest goes out as markdown, so lines get an
/// explicit hard break.
pub struct DingTalkNotifier {
    webhook_url: String,
    batch_bytes: usize,
    batch_interval: Duration,
    client: Client,
}

impl DingTalkNotifier {
    pub fn new(url: impl Into<String>, batch_bytes: usize, batch_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(DINGTALK_TIMEOUT)
            .build()
            .context("building dingtalk client")?;
        Ok(Self {
            webhook_url: url.into(),
            batch_bytes,
            batch_interval,
            client,
        })
    }

    pub fn payloads(&self, digest: &Digest) -> Vec<serde_json::Value> {
        let title = digest.headline();
        // markdown needs two trailing spaces for a line break
        let markdown = digest.text.replace('\n', "  \n");
        labelled_batches(&markdown, self.batch_bytes)
            .into_iter()
            .map(|text| {
                serde_json::json!({
                    "msgtype": "markdown",
                    "markdown": { "title": title, "text": text }
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for DingTalkNotifier {
    fn name(&self) -> &'static str {
        "dingtalk"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        let bodies = self.payloads(digest);
        tracing::info!(channel = "dingtalk", batches = bodies.len(), "sending");
        post_batches(&self.client, &self.webhook_url, "dingtalk", bodies, self.batch_interval).await
    }
}
