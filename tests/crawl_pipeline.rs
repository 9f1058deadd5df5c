// tests/crawl_pipeline.rs
//
// Crawler over a mix of REST and RSS sources with scripted responses.

mod common;

use common::{api_body, ok, status, ScriptedClient};
use trend_radar::error::SourceFailure;
use trend_radar::ingest::fetcher::RetryPolicy;
use trend_radar::{Crawler, SourceSpec};

const ENDPOINT: &str = "https://agg.test/api/s";
const FEED: &str = "https://news.example.test/rss.xml";
const BROKEN_FEED: &str = "https://broken.example.test/rss.xml";
const HTML_PAGE: &str = "https://html.example.test/";

fn rest_url(id: &str) -> String {
    format!("{ENDPOINT}?id={id}&latest")
}

fn sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new("weibo", Some("Weibo".into())),
        SourceSpec::new("zhihu", Some("Zhihu".into())),
        SourceSpec::new(FEED, Some("Example RSS".into())),
        SourceSpec::new(BROKEN_FEED, None),
        SourceSpec::new(HTML_PAGE, None),
        SourceSpec::new("baidu", None),
    ]
}

fn scripted() -> std::sync::Arc<ScriptedClient> {
    let client = ScriptedClient::new();
    client.script(
        &rest_url("weibo"),
        vec![ok(api_body("success", &["Alpha", "  ", "Beta", "Alpha"]))],
    );
    client.script(&rest_url("zhihu"), vec![status(503)]);
    client.script(
        FEED,
        vec![ok(std::fs::read_to_string("tests/fixtures/rss_feed.xml").unwrap())],
    );
    client.script(
        BROKEN_FEED,
        vec![ok(std::fs::read_to_string("tests/fixtures/truncated_feed.xml").unwrap())],
    );
    client.script(HTML_PAGE, vec![ok("<html><body>not a feed</body></html>")]);
    client.script(&rest_url("baidu"), vec![ok(r#"{"status":"success","items":"oops"}"#)]);
    client
}

#[tokio::test]
async fn crawl_collects_titles_and_failures_in_order() {
    let client = scripted();
    let crawler = Crawler::new(client.clone(), ENDPOINT, RetryPolicy::immediate(), 1);
    let result = crawler.crawl_all(&sources(), 0).await;

    // Failures in crawl order, whatever the cause.
    assert_eq!(
        result.failed_ids,
        vec!["zhihu".to_string(), HTML_PAGE.to_string(), "baidu".to_string()]
    );
    assert!(matches!(result.failures[0], SourceFailure::Fetch(ref f) if f.attempts == 2));
    assert!(matches!(result.failures[1], SourceFailure::Parse { .. }));
    assert!(matches!(result.failures[2], SourceFailure::Parse { .. }));

    // REST: blank titles dropped, duplicate positions accumulated.
    let weibo = result.snapshot.get("weibo").unwrap();
    assert_eq!(weibo.len(), 2);
    assert_eq!(weibo["Alpha"].ranks, vec![1, 4]);
    assert_eq!(weibo["Beta"].ranks, vec![3]);
    assert_eq!(weibo["Alpha"].mobile_url, "https://m.e.test/0");

    // RSS: duplicates folded, untitled placeholder, link in both url fields.
    let feed = result.snapshot.get(FEED).unwrap();
    assert_eq!(feed["OpenAI ships a new model"].ranks, vec![1, 3]);
    assert_eq!(feed["Untitled"].ranks, vec![4]);
    assert_eq!(feed["Untitled"].url, "https://news.example.test/a/4");
    assert_eq!(feed["Untitled"].mobile_url, "https://news.example.test/a/4");
    assert!(feed.contains_key("Tesla\u{a0}recall widens"));

    // Partial feed keeps its complete entries and is not a failure.
    let broken = result.snapshot.get(BROKEN_FEED).unwrap();
    let titles: Vec<_> = broken.keys().map(String::as_str).collect();
    assert_eq!(titles, vec!["first complete entry", "second complete entry"]);

    assert!(!result.snapshot.contains("zhihu"));
    assert!(!result.snapshot.contains("baidu"));
    assert_eq!(result.snapshot.total_titles(), 2 + 4 + 2);
}

#[tokio::test]
async fn rss_sources_are_fetched_once_and_rest_retried() {
    let client = scripted();
    let crawler = Crawler::new(client.clone(), ENDPOINT, RetryPolicy::immediate(), 2);
    crawler.crawl_all(&sources(), 0).await;

    assert_eq!(client.calls_to(&rest_url("zhihu")), 3);
    assert_eq!(client.calls_to(HTML_PAGE), 1);
    assert_eq!(client.calls_to(FEED), 1);
    assert_eq!(client.calls_to(&rest_url("weibo")), 1);
}

#[tokio::test]
async fn rss_entry_limit_applies() {
    let client = scripted();
    let crawler =
        Crawler::new(client.clone(), ENDPOINT, RetryPolicy::immediate(), 0).with_rss_entry_limit(2);
    let result = crawler
        .crawl_all(&[SourceSpec::new(FEED, None)], 0)
        .await;
    let feed = result.snapshot.get(FEED).unwrap();
    assert_eq!(feed.len(), 2);
    assert!(result.failed_ids.is_empty());
}

#[tokio::test]
async fn pacing_sleeps_between_sources_only() {
    let client = ScriptedClient::new();
    for id in ["a", "b", "c"] {
        client.script(&rest_url(id), vec![ok(api_body("success", &[id]))]);
    }
    let crawler = Crawler::new(client.clone(), ENDPOINT, RetryPolicy::immediate(), 0);
    let sources: Vec<_> = ["a", "b", "c"].iter().map(|id| SourceSpec::new(*id, None)).collect();

    let t0 = std::time::Instant::now();
    let result = crawler.crawl_all(&sources, 100).await;
    let elapsed = t0.elapsed().as_millis();

    assert_eq!(result.snapshot.len(), 3);
    // two gaps of 90..=120 ms
    assert!(elapsed >= 180, "elapsed {elapsed}ms");
    assert_eq!(client.calls().len(), 3);
}
