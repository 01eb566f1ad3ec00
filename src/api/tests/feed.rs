use super::*;
use crate::feed::DOWNLOADING_MARKER;

fn parse_rss(bytes: &[u8]) -> rss::Channel {
    rss::Channel::read_from(bytes).unwrap()
}

#[tokio::test]
async fn named_feed_renders_rss_with_local_enclosures() {
    let app = TestApp::new(FakeSource::new()).await;

    let response = app.get("/feeds/owls").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-type"),
        Some("application/rss+xml; charset=utf-8")
    );
    let channel = parse_rss(&body_bytes(response).await);
    assert_eq!(channel.title(), "Night Owls");
    assert_eq!(channel.items().len(), 2);
    for item in channel.items() {
        assert!(item.title().unwrap().ends_with(DOWNLOADING_MARKER));
        let url = item.enclosure().unwrap().url();
        assert!(url.starts_with("http://127.0.0.1:8080/media/"), "{url}");
    }
}

#[tokio::test]
async fn rendering_prefetches_every_track() {
    let source = FakeSource::new();
    let _first = source.push_channel(None);
    let _second = source.push_channel(None);
    let app = TestApp::new(source).await;

    let response = app.get("/feeds/owls").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.manager.fetches_scheduled(), 2);
    assert_eq!(app.manager.list().await.len(), 2);
}

#[tokio::test]
async fn rendering_twice_schedules_each_track_once() {
    let source = FakeSource::new();
    let _first = source.push_channel(None);
    let _second = source.push_channel(None);
    let app = TestApp::new(source).await;

    app.get("/feeds/owls").await;
    app.get("/feeds/owls").await;

    assert_eq!(app.manager.fetches_scheduled(), 2);
    assert_eq!(app.scraper.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_feed_name_is_not_found() {
    let app = TestApp::new(FakeSource::new()).await;

    let response = app.get("/feeds/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.scraper.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn arbitrary_feed_by_url() {
    let app = TestApp::new(FakeSource::new()).await;

    let response = app
        .get(&format!("/feed?url={}", urlencoding::encode(FEED_URL)))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let channel = parse_rss(&body_bytes(response).await);
    assert_eq!(channel.link(), FEED_URL);
}

#[tokio::test]
async fn arbitrary_feed_rejects_malformed_url() {
    let app = TestApp::new(FakeSource::new()).await;

    let response = app.get("/feed?url=not%20a%20url").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.scraper.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn arbitrary_feeds_can_be_disabled() {
    let app = TestApp::with_config(FakeSource::new(), |c| {
        c.server.allow_arbitrary_feeds = false;
    })
    .await;

    let response = app
        .get(&format!("/feed?url={}", urlencoding::encode(FEED_URL)))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scrape_failure_is_bad_gateway() {
    let app = TestApp::new(FakeSource::new()).await;

    let response = app
        .get("/feed?url=https%3A%2F%2Fother.example%2Fartist")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"]["code"], "feed_upstream_status");
}
