// src/config/mod.rs
//! Application configuration: `config/config.toml` plus environment overrides.
//!
//! Built once at startup and handed to each component by reference.

pub mod keywords;

use anyhow::Result;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::ingest::fetcher::DEFAULT_API_ENDPOINT;
use crate::ingest::types::SourceSpec;

pub const ENV_CONFIG_PATH: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub report: ReportConfig,
    pub notification: NotificationConfig,
    pub platforms: Vec<PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub enable_crawler: bool,
    /// Milliseconds between two source requests (before jitter).
    pub request_interval: u64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub api_endpoint: String,
    pub use_proxy: bool,
    pub default_proxy: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            enable_crawler: true,
            request_interval: 1000,
            max_retries: 2,
            request_timeout_secs: 10,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            use_proxy: false,
            default_proxy: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Report label carried into push records and email subjects.
    pub mode: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            mode: "daily".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enable_notification: bool,
    /// Max bytes per Feishu message.
    pub feishu_batch_size: usize,
    /// Max bytes per DingTalk message.
    pub dingtalk_batch_size: usize,
    /// Seconds between consecutive batches of one channel.
    pub batch_send_interval: f64,
    pub push_window: PushWindowConfig,
    pub webhooks: WebhookConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_notification: true,
            feishu_batch_size: 29_000,
            dingtalk_batch_size: 20_000,
            batch_send_interval: 1.0,
            push_window: PushWindowConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PushWindowConfig {
    pub enabled: bool,
    pub time_range: TimeRange,
    pub once_per_day: bool,
    pub push_record_retention_days: u32,
}

impl Default for PushWindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time_range: TimeRange::default(),
            once_per_day: true,
            push_record_retention_days: 7,
        }
    }
}

/// Zero-padded `HH:MM` bounds, both inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: "08:00".to_string(),
            end: "22:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub feishu_url: String,
    pub dingtalk_url: String,
    pub email_from: String,
    pub email_password: String,
    /// Comma separated recipients.
    pub email_to: String,
    pub email_smtp_server: String,
    pub email_smtp_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn env_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

fn hhmm_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("static HH:MM regex"))
}

pub fn is_valid_hhmm(s: &str) -> bool {
    hhmm_regex().is_match(s)
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads the file, applies process-environment overrides, validates.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::read_file(path)?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate(path)?;
        tracing::info!(
            path = %path.display(),
            platforms = cfg.platforms.len(),
            push_window = cfg.notification.push_window.enabled,
            "configuration loaded"
        );
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Non-empty values returned by `lookup` win over file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("REPORT_MODE") {
            self.report.mode = v;
        }
        if let Some(v) = get("ENABLE_CRAWLER") {
            self.crawler.enable_crawler = env_flag(&v);
        }
        if let Some(v) = get("ENABLE_NOTIFICATION") {
            self.notification.enable_notification = env_flag(&v);
        }

        let window = &mut self.notification.push_window;
        if let Some(v) = get("PUSH_WINDOW_ENABLED") {
            window.enabled = env_flag(&v);
        }
        if let Some(v) = get("PUSH_WINDOW_START") {
            window.time_range.start = v;
        }
        if let Some(v) = get("PUSH_WINDOW_END") {
            window.time_range.end = v;
        }
        if let Some(v) = get("PUSH_WINDOW_ONCE_PER_DAY") {
            window.once_per_day = env_flag(&v);
        }
        // 0 or garbage keeps the file value
        if let Some(days) = get("PUSH_WINDOW_RETENTION_DAYS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|d| *d > 0)
        {
            window.push_record_retention_days = days;
        }

        let hooks = &mut self.notification.webhooks;
        for (key, slot) in [
            ("FEISHU_WEBHOOK_URL", &mut hooks.feishu_url),
            ("DINGTALK_WEBHOOK_URL", &mut hooks.dingtalk_url),
            ("EMAIL_FROM", &mut hooks.email_from),
            ("EMAIL_PASSWORD", &mut hooks.email_password),
            ("EMAIL_TO", &mut hooks.email_to),
            ("EMAIL_SMTP_SERVER", &mut hooks.email_smtp_server),
        ] {
            if let Some(v) = get(key) {
                *slot = v;
            }
        }
        if let Some(port) = get("EMAIL_SMTP_PORT").and_then(|v| v.parse::<u16>().ok()) {
            hooks.email_smtp_port = Some(port);
        }
    }

    pub fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        if self.platforms.is_empty() {
            return Err(invalid("no platforms configured".to_string()));
        }
        if let Some(p) = self.platforms.iter().find(|p| p.id.trim().is_empty()) {
            return Err(invalid(format!("platform with empty id (name {:?})", p.name)));
        }
        let range = &self.notification.push_window.time_range;
        for (label, value) in [("start", &range.start), ("end", &range.end)] {
            if !is_valid_hhmm(value) {
                return Err(invalid(format!(
                    "push window {label} `{value}` is not a zero-padded HH:MM time"
                )));
            }
        }
        if self.notification.feishu_batch_size == 0 || self.notification.dingtalk_batch_size == 0
        {
            return Err(invalid("batch sizes must be positive".to_string()));
        }
        if !self.notification.batch_send_interval.is_finite()
            || self.notification.batch_send_interval < 0.0
        {
            return Err(invalid("batch_send_interval must be >= 0".to_string()));
        }
        Ok(())
    }

    pub fn sources(&self) -> Vec<SourceSpec> {
        self.platforms
            .iter()
            .map(|p| SourceSpec::new(p.id.trim(), p.name.clone()))
            .collect()
    }

    pub fn proxy(&self) -> Option<&str> {
        if !self.crawler.use_proxy {
            return None;
        }
        self.crawler
            .default_proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Explicit path, else `$CONFIG_PATH`, else `config/config.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    std::env::var(ENV_CONFIG_PATH)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
