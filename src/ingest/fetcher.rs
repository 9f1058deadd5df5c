// src/ingest/fetcher.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{FetchErrorKind, FetchFailure};
use crate::ingest::types::SourceSpec;

pub const DEFAULT_API_ENDPOINT: &str = "https://newsnow.busiyi.world/api/s";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response-level `status` values that count as success.
pub const ACCEPTED_STATUSES: [&str; 2] = ["success", "cache"];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain GET seam. Production uses [`ReqwestClient`]; tests script responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, FetchErrorKind>;
}

pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout);
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .with_context(|| format!("invalid proxy url {proxy_url}"))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build().context("building HTTP client")?,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchErrorKind {
    if e.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Network(e.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, FetchErrorKind> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(classify_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

/// Sleep between attempts: uniform `[jitter_min, jitter_max)` seconds plus
/// `step` seconds per attempt already made.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
    pub step_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            jitter_min_secs: 3.0,
            jitter_max_secs: 5.0,
            step_secs: 1.0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            jitter_min_secs: 0.0,
            jitter_max_secs: 0.0,
            step_secs: 0.0,
        }
    }

    /// `attempt` is the 0-based index of the attempt that just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let min = self.jitter_min_secs.max(0.0);
        let max = self.jitter_max_secs.max(min);
        let jitter = if max > min {
            rand::rng().random_range(min..max)
        } else {
            min
        };
        let secs = jitter + self.step_secs.max(0.0) * f64::from(attempt);
        Duration::from_secs_f64(secs)
    }
}

/// A validated aggregator response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub id: String,
    pub alias: String,
    pub body: String,
}

/// Accepts the body only if its `status` field is one of [`ACCEPTED_STATUSES`].
pub fn check_response_status(body: &str) -> std::result::Result<(), FetchErrorKind> {
    #[derive(Deserialize)]
    struct StatusProbe {
        #[serde(default)]
        status: Option<serde_json::Value>,
    }

    let probe: StatusProbe =
        serde_json::from_str(body).map_err(|e| FetchErrorKind::InvalidBody(e.to_string()))?;
    match probe.status {
        Some(serde_json::Value::String(s)) if ACCEPTED_STATUSES.contains(&s.as_str()) => Ok(()),
        Some(serde_json::Value::String(s)) => Err(FetchErrorKind::RejectedStatus(s)),
        Some(other) => Err(FetchErrorKind::RejectedStatus(other.to_string())),
        None => Err(FetchErrorKind::RejectedStatus("<missing>".to_string())),
    }
}

/// Bounded-retry fetch of one REST source. Holds no state besides its config.
pub struct Fetcher {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            policy,
        }
    }

    pub fn source_url(&self, id: &str) -> String {
        format!("{}?id={}&latest", self.endpoint.trim_end_matches('?'), id)
    }

    /// Performs up to `max_retries + 1` attempts.
    pub async fn fetch(
        &self,
        source: &SourceSpec,
        max_retries: u32,
    ) -> std::result::Result<RawResponse, FetchFailure> {
        let url = self.source_url(&source.id);
        let total = max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 0..total {
            counter!("crawl_fetch_attempts_total").increment(1);
            let t0 = Instant::now();
            let outcome = self.try_once(&url).await;
            histogram!("crawl_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            match outcome {
                Ok(body) => {
                    tracing::info!(
                        source = %source.id,
                        alias = %source.alias,
                        attempt = attempt + 1,
                        "fetched source"
                    );
                    return Ok(RawResponse {
                        id: source.id.clone(),
                        alias: source.alias.clone(),
                        body,
                    });
                }
                Err(kind) => {
                    if attempt + 1 < total {
                        let wait = self.policy.backoff(attempt);
                        tracing::warn!(
                            source = %source.id,
                            alias = %source.alias,
                            attempt = attempt + 1,
                            error = %kind,
                            wait_secs = wait.as_secs_f64(),
                            "fetch failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    } else {
                        tracing::warn!(
                            source = %source.id,
                            alias = %source.alias,
                            attempts = total,
                            error = %kind,
                            "fetch failed, giving up"
                        );
                    }
                    last_error = Some(kind);
                }
            }
        }

        Err(FetchFailure {
            id: source.id.clone(),
            alias: source.alias.clone(),
            attempts: total,
            cause: last_error
                .unwrap_or_else(|| FetchErrorKind::Network("no attempt made".to_string())),
        })
    }

    async fn try_once(&self, url: &str) -> std::result::Result<String, FetchErrorKind> {
        let resp = self.http.get(url).await?;
        if !resp.is_success() {
            return Err(FetchErrorKind::HttpStatus(resp.status));
        }
        check_response_status(&resp.body)?;
        Ok(resp.body)
    }
}
