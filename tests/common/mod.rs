// tests/common/mod.rs
//
// Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use trend_radar::error::FetchErrorKind;
use trend_radar::ingest::fetcher::{HttpClient, HttpResponse};
use trend_radar::notify::{Digest, Notifier};

pub type Reply = Result<HttpResponse, FetchErrorKind>;

pub fn ok(body: impl Into<String>) -> Reply {
    Ok(HttpResponse {
        status: 200,
        body: body.into(),
    })
}

pub fn status(code: u16) -> Reply {
    Ok(HttpResponse {
        status: code,
        body: String::new(),
    })
}

/// JSON body in the aggregator's shape.
pub fn api_body(status: &str, titles: &[&str]) -> String {
    let items: Vec<_> = titles
        .iter()
        .enumerate()
        .map(|(i, t)| {
            serde_json::json!({
                "title": t,
                "url": format!("https://e.test/{i}"),
                "mobileUrl": format!("https://m.e.test/{i}"),
            })
        })
        .collect();
    serde_json::json!({ "status": status, "items": items }).to_string()
}

/// Replies scripted per URL. The last reply of a script repeats forever;
/// unknown URLs get a network error.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, url: &str, replies: Vec<Reply>) {
        self.scripts.lock().insert(url.to_string(), replies);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchErrorKind> {
        self.calls.lock().push(url.to_string());
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(replies) if replies.len() > 1 => replies.remove(0),
            Some(replies) if replies.len() == 1 => replies[0].clone(),
            _ => Err(FetchErrorKind::Network(format!("no script for {url}"))),
        }
    }
}

/// Channel that records digests and optionally fails.
#[derive(Clone)]
pub struct RecordingNotifier {
    pub name: &'static str,
    pub fail: bool,
    pub sent: Arc<Mutex<Vec<Digest>>>,
}

impl RecordingNotifier {
    pub fn ok(name: &'static str) -> Self {
        Self {
            name,
            fail: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::ok(name)
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, digest: &Digest) -> anyhow::Result<()> {
        self.sent.lock().push(digest.clone());
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(())
    }
}
