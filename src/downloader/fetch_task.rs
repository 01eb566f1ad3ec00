//! Fetch task execution — streams one track from upstream into the cache.
//!
//! Lifecycle of a single fetch:
//! 1. Discard any leftover `.part` file
//! 2. Open the upstream connection (bounded retry)
//! 3. Reconcile response headers into the record, move to `InProgress`
//! 4. Append each chunk to `<path>.part`, publishing `bytes_written` after every write
//! 5. Verify the declared length, fsync, close, rename to `<path>`, publish `Complete`

use crate::config::Config;
use crate::error::FetchError;
use crate::retry::with_retry;
use crate::types::{DownloadRecord, DownloadState, Event, TrackId, part_path_for};
use crate::utils::remove_if_exists;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{DownloadManager, FetchJob, MediaSource};

/// Shared context for a single fetch task
pub(crate) struct FetchTaskContext {
    pub(crate) job: FetchJob,
    pub(crate) source: Arc<dyn MediaSource>,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) active_downloads: Arc<Mutex<HashMap<TrackId, u64>>>,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) fatal_token: CancellationToken,
}

impl FetchTaskContext {
    pub(crate) fn new(manager: &DownloadManager, job: FetchJob, cancel_token: CancellationToken) -> Self {
        Self {
            job,
            source: Arc::clone(&manager.source),
            config: Arc::clone(&manager.config),
            event_tx: manager.event_tx.clone(),
            active_downloads: Arc::clone(&manager.queue_state.active_downloads),
            cancel_token,
            fatal_token: manager.queue_state.fatal_token.clone(),
        }
    }

    fn status(&self) -> &watch::Sender<DownloadRecord> {
        &self.job.status
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Remove this fetch from the active downloads map.
    ///
    /// A restart of the same track may already own the entry; it is left alone.
    pub(super) async fn remove_from_active(&self) {
        let mut active = self.active_downloads.lock().await;
        let owned = active
            .get(&self.job.track_id)
            .is_some_and(|generation| *generation == self.job.generation);
        if owned {
            active.remove(&self.job.track_id);
        }
    }

    /// Record the failure and emit the failure event.
    ///
    /// Resource exhaustion additionally trips the fatal token.
    fn mark_failed(&self, error: FetchError) {
        let id = &self.job.track_id;
        let message = error.to_string();

        self.status().send_modify(|record| {
            record.state = DownloadState::Failed;
            record.last_error = Some(message.clone());
        });

        match &error {
            FetchError::Abandoned => {
                tracing::info!(track_id = %id, "Download abandoned, partial file left on disk");
            }
            e if e.is_fatal() => {
                tracing::error!(track_id = %id, error = %e, "Cache is unusable");
            }
            e => {
                tracing::warn!(track_id = %id, error = %e, "Download failed");
            }
        }

        self.emit(Event::DownloadFailed {
            track_id: id.clone(),
            error: message.clone(),
        });

        if error.is_fatal() {
            self.emit(Event::CacheFailure { error: message });
            self.fatal_token.cancel();
        }
    }
}

/// Core fetch task -- runs one fetch to completion, failure, or cancellation.
pub(crate) async fn run_fetch_task(ctx: FetchTaskContext) {
    let id = ctx.job.track_id.clone();
    tracing::info!(track_id = %id, music_url = %ctx.job.music_url, "Download started");

    let result = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => Err(FetchError::Abandoned),
        result = fetch_to_disk(&ctx) => result,
    };

    match result {
        Ok(total) => {
            tracing::info!(track_id = %id, total_bytes = total, "Download complete");
        }
        Err(e) => ctx.mark_failed(e),
    }

    ctx.remove_from_active().await;
}

async fn fetch_to_disk(ctx: &FetchTaskContext) -> Result<u64, FetchError> {
    let job = &ctx.job;
    let part_path = part_path_for(&job.local_path);

    if let Some(parent) = job.local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Never resume: upstream range support is not assumed
    remove_if_exists(&part_path).await?;

    let source = &ctx.source;
    let music_url = job.music_url.as_str();
    let response = with_retry(&ctx.config.retry, move || source.open(music_url)).await?;

    // Upstream is authoritative for length, type and date
    let declared = response.content_length;
    ctx.status().send_modify(|record| {
        record.state = DownloadState::InProgress;
        if declared.is_some() {
            record.total_bytes = declared;
        }
        if response.content_type.is_some() {
            record.content_type = response.content_type.clone();
        }
        if response.last_modified.is_some() {
            record.last_modified = response.last_modified;
        }
    });
    ctx.emit(Event::DownloadStarted {
        track_id: job.track_id.clone(),
        total_bytes: declared,
    });

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&part_path)
        .await?;

    let read_timeout = ctx.config.cache.read_timeout;
    let progress_interval = Duration::from_millis(ctx.config.cache.progress_interval_ms);
    let mut last_progress = Instant::now();
    let mut written: u64 = 0;
    let mut body = response.body;

    loop {
        let chunk = match tokio::time::timeout(read_timeout, body.next()).await {
            Ok(Some(chunk)) => chunk?,
            Ok(None) => break,
            Err(_) => return Err(FetchError::ReadTimeout(read_timeout)),
        };
        if chunk.is_empty() {
            continue;
        }

        let next = written + chunk.len() as u64;
        if let Some(expected) = declared.filter(|&expected| next > expected) {
            return Err(FetchError::Overrun { expected });
        }

        file.write_all(&chunk).await?;
        file.flush().await?;

        // Publish only after the bytes reached the file
        written = next;
        ctx.status().send_modify(|record| record.bytes_written = written);

        if last_progress.elapsed() >= progress_interval {
            last_progress = Instant::now();
            ctx.emit(Event::DownloadProgress {
                track_id: job.track_id.clone(),
                bytes_written: written,
                total_bytes: declared,
            });
        }
    }

    if let Some(expected) = declared.filter(|&expected| written < expected) {
        return Err(FetchError::Truncated { written, expected });
    }

    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&part_path, &job.local_path).await?;

    ctx.status().send_modify(|record| {
        record.state = DownloadState::Complete;
        record.bytes_written = written;
        record.total_bytes = Some(written);
        record.last_error = None;
    });
    ctx.emit(Event::DownloadComplete {
        track_id: job.track_id.clone(),
        total_bytes: written,
    });

    Ok(written)
}
