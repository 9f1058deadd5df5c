// src/notify/feishu.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{labelled_batches, post_batches, Digest, Notifier};

pub const FEISHU_TIMEOUT: Duration = Duration::from_secs(10);

/// Feishu custom-bot webhook, plain text messages.
pub struct FeishuNotifier {
    webhook_url: String,
    batch_bytes: usize,
    batch_interval: Duration,
    client: Client,
}

impl FeishuNotifier {
    pub fn new(url: impl Into<String>, batch_bytes: usize, batch_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(FEISHU_TIMEOUT)
            .build()
            .context("building feishu client")?;
        Ok(Self {
            webhook_url: url.into(),
            batch_bytes,
            batch_interval,
            client,
        })
    }

    pub fn payloads(&self, digest: &Digest) -> Vec<serde_json::Value> {
        labelled_batches(&digest.text, self.batch_bytes)
            .into_iter()
            .map(|text| serde_json::json!({ "msg_type": "text", "content": { "text": text } }))
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for FeishuNotifier {
    fn name(&self) -> &'static str {
        "feishu"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        let bodies = self.payloads(digest);
        tracing::info!(channel = "feishu", batches = bodies.len(), "sending");
        post_batches(&self.client, &self.webhook_url, "feishu", bodies, self.batch_interval).await
    }
}
