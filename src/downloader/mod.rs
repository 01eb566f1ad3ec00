//! Download Manager: concurrent track fetching and on-disk cache state.
//!
//! The `DownloadManager` struct and its methods are organized by concern:
//! - [`source`] - Upstream media abstraction (`MediaSource`) and its HTTP implementation
//! - [`queue`] - `ensure_downloading` and fetch scheduling
//! - [`queue_processor`] - Bounded worker pool feeding fetch tasks
//! - [`fetch_task`] - Streaming one track to disk
//! - [`reader`] - Read access to partial and complete files
//! - [`lifecycle`] - Shutdown and fatal-error coordination
//!
//! Every [`DownloadRecord`] lives in its own `tokio::sync::watch` channel. The
//! fetch task is the only writer; status readers borrow a consistent snapshot.

mod fetch_task;
mod lifecycle;
mod queue;
mod queue_processor;
mod reader;
mod source;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use reader::MediaReader;
pub use source::{ByteStream, HttpMediaSource, MediaResponse, MediaSource};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::TrackLocator;
use crate::types::{DownloadRecord, Event, Track, TrackId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use tokio::sync::{Mutex, Semaphore, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// A scheduled fetch, handed from `ensure_downloading` to the queue processor
pub(crate) struct FetchJob {
    pub(crate) track_id: TrackId,
    pub(crate) music_url: String,
    pub(crate) local_path: PathBuf,
    pub(crate) status: Arc<watch::Sender<DownloadRecord>>,
    /// Distinguishes a restarted fetch from the one it replaced
    pub(crate) generation: u64,
}

/// Every record and every known track, keyed by identity
#[derive(Default)]
pub(crate) struct Registry {
    /// Latest metadata per track; resolves media requests to upstream URLs
    pub(crate) tracks: HashMap<TrackId, Track>,
    /// At most one status channel per track
    pub(crate) records: HashMap<TrackId, Arc<watch::Sender<DownloadRecord>>>,
}

/// Queue and download state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Sending half of the fetch queue
    pub(crate) job_tx: mpsc::UnboundedSender<FetchJob>,
    /// Semaphore to limit concurrent fetches (respects max_concurrent_downloads config)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Running fetches, keyed by track, with the generation of the job
    pub(crate) active_downloads: Arc<Mutex<HashMap<TrackId, u64>>>,
    /// Flag to indicate whether new fetches are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled once at shutdown; stops the queue processor
    pub(crate) shutdown_token: CancellationToken,
    /// Cancelled when the cache becomes unusable
    pub(crate) fatal_token: CancellationToken,
    /// Number of fetches ever scheduled
    pub(crate) fetches_scheduled: Arc<AtomicU64>,
    /// Source of `FetchJob::generation`
    pub(crate) next_generation: Arc<AtomicU64>,
}

/// Download Manager instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadManager {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Maps tracks to cache paths
    pub(crate) locator: TrackLocator,
    /// Where media bytes come from
    pub(crate) source: Arc<dyn MediaSource>,
    /// Records and reverse index
    pub(crate) registry: Arc<Mutex<Registry>>,
    /// Queue and download state management
    pub(crate) queue_state: QueueState,
}

impl DownloadManager {
    /// Create a manager that fetches over HTTP
    ///
    /// Creates the cache directory and starts the worker pool. Fails with
    /// [`Error::CacheUnavailable`] if the cache directory cannot be created.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let source = Arc::new(HttpMediaSource::new(&config)?);
        Self::with_source(config, source).await
    }

    /// Create a manager reading media from a custom [`MediaSource`]
    pub async fn with_source(config: Arc<Config>, source: Arc<dyn MediaSource>) -> Result<Self> {
        let cache_dir = config.cache.cache_dir.clone();
        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| Error::CacheUnavailable {
                path: cache_dir.clone(),
                reason: e.to_string(),
            })?;

        let locator = TrackLocator::new(&config.server.public_url, cache_dir)?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        let queue_state = QueueState {
            job_tx,
            concurrent_limit: Arc::new(Semaphore::new(config.cache.max_concurrent_downloads)),
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            fatal_token: CancellationToken::new(),
            fetches_scheduled: Arc::new(AtomicU64::new(0)),
            next_generation: Arc::new(AtomicU64::new(0)),
        };

        let manager = Self {
            event_tx,
            config,
            locator,
            source,
            registry: Arc::new(Mutex::new(Registry::default())),
            queue_state,
        };

        manager.start_queue_processor(job_rx);

        tracing::info!(
            cache_dir = %manager.locator.cache_dir().display(),
            max_concurrent_downloads = manager.config.cache.max_concurrent_downloads,
            "Download manager started"
        );

        Ok(manager)
    }

    /// Subscribe to download events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls
    /// more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this manager runs with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The locator this manager derives cache paths with
    pub fn locator(&self) -> &TrackLocator {
        &self.locator
    }

    /// Record the latest metadata for a track seen in the feed at `feed_url`
    ///
    /// Media requests are resolved through this index, so every track that is
    /// published with a local URL must be remembered first.
    pub async fn remember(&self, feed_url: &str, track: &Track) -> Result<TrackId> {
        let id = track.id()?;
        tracing::trace!(track_id = %id, feed_url, "Remembering track");
        self.registry
            .lock()
            .await
            .tracks
            .insert(id.clone(), track.clone());
        Ok(id)
    }

    /// Look up a remembered track
    pub async fn track(&self, id: &TrackId) -> Option<Track> {
        self.registry.lock().await.tracks.get(id).cloned()
    }

    /// Snapshot of one track's download status
    pub async fn get_status(&self, id: &TrackId) -> Option<DownloadRecord> {
        let registry = self.registry.lock().await;
        registry.records.get(id).map(|tx| tx.borrow().clone())
    }

    /// Snapshots of every record, oldest first
    pub async fn list(&self) -> Vec<DownloadRecord> {
        let mut records: Vec<DownloadRecord> = {
            let registry = self.registry.lock().await;
            registry
                .records
                .values()
                .map(|tx| tx.borrow().clone())
                .collect()
        };
        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        records
    }

    /// Number of fetches scheduled since startup
    pub fn fetches_scheduled(&self) -> u64 {
        self.queue_state
            .fetches_scheduled
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
