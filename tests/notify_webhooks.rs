// tests/notify_webhooks.rs
//
// Feishu and DingTalk transports against a loopback capture server.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::TimeZone;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use trend_radar::analyze::{Aggregation, GroupStat, MatchedTitle};
use trend_radar::clock::shanghai_offset;
use trend_radar::config::NotificationConfig;
use trend_radar::notify::dingtalk::DingTalkNotifier;
use trend_radar::notify::feishu::FeishuNotifier;
use trend_radar::notify::{build_digest, Digest, Notifier, NotifierMux};

type Captured = Arc<Mutex<Vec<(String, Value)>>>;

async fn spawn_capture() -> (String, Captured) {
    let captured: Captured = Arc::default();

    async fn feishu(State(c): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        c.lock().push(("feishu".into(), body));
        Json(json!({ "StatusCode": 0, "code": 0, "msg": "success" }))
    }
    async fn dingtalk(State(c): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        c.lock().push(("dingtalk".into(), body));
        Json(json!({ "errcode": 0, "errmsg": "ok" }))
    }
    async fn rejecting(State(c): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        c.lock().push(("rejecting".into(), body));
        Json(json!({ "code": 19021, "msg": "sign match fail" }))
    }
    async fn broken() -> StatusCode {
        StatusCode::BAD_GATEWAY
    }

    let app = Router::new()
        .route("/feishu", post(feishu))
        .route("/dingtalk", post(dingtalk))
        .route("/rejecting", post(rejecting))
        .route("/broken", post(broken))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}

fn digest(groups: usize) -> Digest {
    let stats = (0..groups)
        .map(|g| GroupStat {
            word: format!("group-{g}"),
            count: 5,
            titles: (0..5)
                .map(|i| MatchedTitle {
                    title: format!("headline {g}-{i} with some padding text"),
                    source_name: "Weibo".into(),
                    ranks: vec![i + 1],
                    url: String::new(),
                    mobile_url: String::new(),
                })
                .collect(),
            percentage: 10.0,
        })
        .collect();
    let agg = Aggregation {
        stats,
        total_titles: 50,
    };
    let now = shanghai_offset().with_ymd_and_hms(2025, 9, 1, 10, 0, 0).unwrap();
    build_digest(&agg, &[], "daily", now).unwrap()
}

#[tokio::test]
async fn feishu_sends_ordered_text_batches() {
    let (base, captured) = spawn_capture().await;
    let n = FeishuNotifier::new(format!("{base}/feishu"), 400, Duration::ZERO).unwrap();
    let d = digest(6);

    n.send(&d).await.unwrap();

    let got = captured.lock().clone();
    assert!(got.len() > 1, "digest should be split");
    for (i, (route, body)) in got.iter().enumerate() {
        assert_eq!(route, "feishu");
        assert_eq!(body["msg_type"], "text");
        let text = body["content"]["text"].as_str().unwrap();
        assert!(text.len() <= 400);
        assert!(text.starts_with(&format!("[batch {}/{}]", i + 1, got.len())));
    }
    let first = got[0].1["content"]["text"].as_str().unwrap();
    assert!(first.contains("📊 TrendRadar report 10:00"));
    let last = got.last().unwrap().1["content"]["text"].as_str().unwrap();
    assert!(last.contains("headline 5-4"));
}

#[tokio::test]
async fn dingtalk_sends_markdown_with_title() {
    let (base, captured) = spawn_capture().await;
    let n = DingTalkNotifier::new(format!("{base}/dingtalk"), 20_000, Duration::ZERO).unwrap();
    n.send(&digest(1)).await.unwrap();

    let got = captured.lock().clone();
    assert_eq!(got.len(), 1);
    let body = &got[0].1;
    assert_eq!(body["msgtype"], "markdown");
    assert_eq!(body["markdown"]["title"], "TrendRadar report - daily - 09-01 10:00");
    let text = body["markdown"]["text"].as_str().unwrap();
    assert!(text.contains("🔥 group-0 (5)  \n"));
}

#[tokio::test]
async fn vendor_error_and_http_error_are_failures() {
    let (base, captured) = spawn_capture().await;

    let rejecting = FeishuNotifier::new(format!("{base}/rejecting"), 400, Duration::ZERO).unwrap();
    let err = rejecting.send(&digest(6)).await.unwrap_err();
    assert!(format!("{err:#}").contains("code=19021"));
    // stops after the first rejected batch
    assert_eq!(captured.lock().len(), 1);

    let broken = DingTalkNotifier::new(format!("{base}/broken"), 20_000, Duration::ZERO).unwrap();
    let err = broken.send(&digest(1)).await.unwrap_err();
    assert!(format!("{err:#}").contains("502"));
}

#[tokio::test]
async fn mux_from_config_builds_configured_channels() {
    let (base, captured) = spawn_capture().await;
    let mut cfg = NotificationConfig::default();
    cfg.batch_send_interval = 0.0;
    cfg.webhooks.feishu_url = format!("{base}/feishu");
    cfg.webhooks.dingtalk_url = format!("{base}/broken");
    // incomplete email settings: channel stays off
    cfg.webhooks.email_from = "bot@example.test".into();

    let mux = NotifierMux::from_config(&cfg);
    assert_eq!(mux.channel_names(), vec!["feishu", "dingtalk"]);

    let outcomes = mux.dispatch(&digest(1)).await;
    assert!(outcomes[0].is_delivered());
    assert!(!outcomes[1].is_delivered());
    assert_eq!(captured.lock().len(), 1);
}
