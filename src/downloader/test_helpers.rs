//! Shared test helpers for creating DownloadManager instances in tests.

use crate::config::Config;
use crate::downloader::{DownloadManager, MediaResponse, MediaSource};
use crate::error::FetchError;
use crate::types::{DownloadRecord, DownloadState, Track, TrackId};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Scripted = Result<MediaResponse, FetchError>;

/// A [`MediaSource`] that replays scripted responses in order.
///
/// Opening with an empty script answers HTTP 404.
#[derive(Default)]
pub(crate) struct FakeSource {
    script: std::sync::Mutex<VecDeque<Scripted>>,
    opens: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times `open` was called
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Script a response delivering `data` in chunks of up to 7 bytes
    pub(crate) fn push_bytes(&self, data: &[u8], content_length: Option<u64>) {
        let chunks: Vec<Result<Bytes, FetchError>> = data
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        self.push(Ok(MediaResponse {
            content_length,
            content_type: Some("audio/mpeg".to_string()),
            last_modified: None,
            body: futures::stream::iter(chunks).boxed(),
        }));
    }

    /// Script a response whose body is fed through the returned sender
    ///
    /// Dropping the sender ends the body.
    pub(crate) fn push_channel(
        &self,
        content_length: Option<u64>,
    ) -> mpsc::UnboundedSender<Result<Bytes, FetchError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Ok(MediaResponse {
            content_length,
            content_type: Some("audio/mpeg".to_string()),
            last_modified: None,
            body: UnboundedReceiverStream::new(rx).boxed(),
        }));
        tx
    }

    /// Script a failure to open
    pub(crate) fn push_error(&self, error: FetchError) {
        self.push(Err(error));
    }

    fn push(&self, scripted: Scripted) {
        self.script.lock().unwrap().push_back(scripted);
    }
}

#[async_trait::async_trait]
impl MediaSource for FakeSource {
    async fn open(&self, music_url: &str) -> Result<MediaResponse, FetchError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(FetchError::UpstreamStatus {
                url: music_url.to_string(),
                status: 404,
            })
        })
    }
}

/// Config pointing at `cache_dir` with fast timeouts and no open retries
pub(crate) fn test_config(cache_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.cache.cache_dir = cache_dir.to_path_buf();
    config.cache.max_concurrent_downloads = 3;
    config.cache.read_timeout = Duration::from_secs(2);
    config.cache.progress_interval_ms = 0;
    config.retry.max_attempts = 0;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.jitter = false;
    config.server.public_url = "http://127.0.0.1:8080".to_string();
    config
}

/// Helper to create a test DownloadManager over `source`.
/// Returns the manager and the tempdir (which must be kept alive).
pub(crate) async fn create_test_manager(
    source: Arc<FakeSource>,
) -> (DownloadManager, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(&temp_dir.path().join("cache"));
    let manager = DownloadManager::with_source(Arc::new(config), source)
        .await
        .unwrap();
    (manager, temp_dir)
}

/// A valid track whose music URL is unique per `n`
pub(crate) fn sample_track(n: usize) -> Track {
    Track::new(
        format!("Track {n}"),
        format!("https://media.example/track/{n}"),
        format!("https://cdn.example/audio/{n}/track.mp3"),
    )
    .unwrap()
}

/// Poll until the record reaches `state`, panicking after two seconds
pub(crate) async fn wait_for_state(
    manager: &DownloadManager,
    id: &TrackId,
    state: DownloadState,
) -> DownloadRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(record) = manager.get_status(id).await {
            if record.state == state {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state}: {:?}",
            manager.get_status(id).await
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until at least `bytes` are written, panicking after two seconds
pub(crate) async fn wait_for_bytes(
    manager: &DownloadManager,
    id: &TrackId,
    bytes: u64,
) -> DownloadRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(record) = manager.get_status(id).await {
            if record.bytes_written >= bytes {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {bytes} bytes"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
