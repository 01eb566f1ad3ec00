//! Common test utilities for trackcast end-to-end tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trackcast::{Config, DownloadManager, FeedConfig, HtmlFeedScraper, api};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic audio bytes of `len` bytes, distinct per `seed`
pub fn audio_bytes(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Artist page listing `tracks` as (title, audio path) pairs in schema.org JSON-LD
pub fn artist_page(upstream: &str, tracks: &[(&str, &str)]) -> String {
    let recordings: Vec<serde_json::Value> = tracks
        .iter()
        .enumerate()
        .map(|(i, (title, audio_path))| {
            serde_json::json!({
                "@type": "MusicRecording",
                "name": title,
                "url": format!("{upstream}/track/{}", i + 1),
                "datePublished": format!("2024-03-0{}T10:00:00Z", i + 1),
                "audio": {
                    "@type": "AudioObject",
                    "contentUrl": format!("{upstream}{audio_path}"),
                    "encodingFormat": "mp3"
                }
            })
        })
        .collect();
    let group = serde_json::json!({
        "@context": "https://schema.org",
        "@type": "MusicGroup",
        "name": "Night Owls",
        "track": recordings,
    });

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta property="og:title" content="Night Owls &amp; Friends">
<meta property="og:description" content="Late night recordings">
<meta property="og:image" content="/img/owls.jpg">
<script type="application/ld+json">{group}</script>
</head>
<body></body>
</html>"#
    )
}

/// Mount an artist page at `/artist/owls` and audio bodies at their paths
pub async fn mount_artist(upstream: &MockServer, tracks: &[(&str, &str, Vec<u8>)]) {
    let listing: Vec<(&str, &str)> = tracks.iter().map(|(t, p, _)| (*t, *p)).collect();
    Mock::given(method("GET"))
        .and(path("/artist/owls"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(artist_page(&upstream.uri(), &listing)),
        )
        .mount(upstream)
        .await;

    for (_, audio_path, body) in tracks {
        Mock::given(method("GET"))
            .and(path(*audio_path))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(body.clone()),
            )
            .mount(upstream)
            .await;
    }
}

/// A trackcast server on an ephemeral port
pub struct RunningServer {
    pub address: SocketAddr,
    pub manager: DownloadManager,
    stop: CancellationToken,
    handle: JoinHandle<trackcast::Result<()>>,
}

impl RunningServer {
    /// Start a server whose only configured feed is `owls` at `{upstream}/artist/owls`
    pub async fn start(upstream: &MockServer, cache_dir: &Path) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let mut config = Config::default();
        config.cache.cache_dir = cache_dir.to_path_buf();
        config.cache.progress_interval_ms = 0;
        config.retry.max_attempts = 0;
        config.server.public_url = format!("http://{address}");
        config.feeds = vec![FeedConfig {
            name: "owls".into(),
            url: format!("{}/artist/owls", upstream.uri()),
        }];
        let config = Arc::new(config);

        let manager = DownloadManager::new(config.clone()).await.unwrap();
        let scraper = Arc::new(HtmlFeedScraper::new(&config).unwrap());
        let state = api::AppState::new(manager.clone(), scraper);
        let stop = CancellationToken::new();
        let handle = tokio::spawn(api::serve(listener, state, stop.clone().cancelled_owned()));

        Self {
            address,
            manager,
            stop,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    /// Stop accepting requests and shut the download manager down
    pub async fn stop(self) {
        self.stop.cancel();
        self.manager.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}

/// Temporary cache directory
pub fn temp_cache() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Poll `url` until it answers 200, returning the body
pub async fn wait_until_served(client: &reqwest::Client, url: &str) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let response = client.get(url).send().await.unwrap();
        if response.status() == reqwest::StatusCode::OK {
            return response.bytes().await.unwrap().to_vec();
        }
        assert!(
            response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE
                || response.status() == reqwest::StatusCode::PARTIAL_CONTENT,
            "unexpected status {} for {url}",
            response.status()
        );
        assert!(Instant::now() < deadline, "timed out waiting for {url}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
