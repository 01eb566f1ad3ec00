use super::*;
use crate::config::FeedConfig;
use crate::downloader::DownloadManager;
use crate::downloader::test_helpers::{FakeSource, sample_track, test_config};
use crate::error::ScrapeError;
use crate::feed::FeedScraper;
use crate::types::{Feed, Track};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

mod feed;

const FEED_URL: &str = "https://media.example/artist/night-owls";

/// Scraper that knows exactly one page
struct StaticScraper {
    feed: Feed,
    calls: AtomicUsize,
}

#[async_trait]
impl FeedScraper for StaticScraper {
    async fn scrape(&self, feed_page_url: &str) -> std::result::Result<Feed, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if feed_page_url == self.feed.url {
            Ok(self.feed.clone())
        } else {
            Err(ScrapeError::UpstreamStatus {
                url: feed_page_url.to_string(),
                status: 404,
            })
        }
    }
}

fn owls_feed() -> Feed {
    let mut feed = Feed::new(FEED_URL, "Night Owls").unwrap();
    feed.tracks = vec![sample_track(1), sample_track(2)];
    feed
}

struct TestApp {
    router: Router,
    manager: DownloadManager,
    scraper: Arc<StaticScraper>,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn new(source: Arc<FakeSource>) -> Self {
        Self::with_config(source, |_| {}).await
    }

    async fn with_config(
        source: Arc<FakeSource>,
        adjust: impl FnOnce(&mut crate::Config),
    ) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&temp_dir.path().join("cache"));
        config.feeds = vec![FeedConfig {
            name: "owls".into(),
            url: FEED_URL.into(),
        }];
        adjust(&mut config);

        let manager = DownloadManager::with_source(Arc::new(config), source)
            .await
            .unwrap();
        let scraper = Arc::new(StaticScraper {
            feed: owls_feed(),
            calls: AtomicUsize::new(0),
        });
        let router = create_router(AppState::new(manager.clone(), scraper.clone()));

        Self {
            router,
            manager,
            scraper,
            _temp_dir: temp_dir,
        }
    }

    async fn get(&self, uri: &str) -> Response {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn request(&self, request: Request) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Path of the media route for `track`, after making it resolvable
    async fn media_path(&self, track: &Track) -> String {
        self.manager.remember(FEED_URL, track).await.unwrap();
        self.manager
            .locator()
            .to_local_url(FEED_URL, &track.web_page_url, &track.music_url)
            .unwrap()
            .path()
            .to_string()
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn cors_headers_when_enabled() {
    let app = TestApp::with_config(FakeSource::new(), |c| {
        c.server.cors_enabled = true;
        c.server.cors_origins = vec!["*".to_string()];
    })
    .await;

    let response = app
        .request(
            Request::builder()
                .uri("/api/v1/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn swagger_ui_only_when_enabled() {
    let app = TestApp::new(FakeSource::new()).await;
    let response = app.get("/swagger-ui/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = TestApp::with_config(FakeSource::new(), |c| c.server.swagger_ui = true).await;
    let response = app.get("/swagger-ui/").await;
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_stops_on_shutdown_signal() {
    let app = TestApp::new(FakeSource::new()).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let state = AppState::new(app.manager.clone(), app.scraper.clone());

    let server = tokio::spawn(serve(listener, state, async {
        stop_rx.await.ok();
    }));
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());
}
