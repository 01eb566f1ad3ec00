//! Scheduling: `ensure_downloading` and the fetch queue.

use crate::error::{Error, Result};
use crate::types::{DownloadRecord, DownloadState, Event, Track, TrackId};
use crate::utils::{existing_file, guess_audio_content_type};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::watch;

use super::{DownloadManager, FetchJob};

impl DownloadManager {
    /// Make sure `track` is downloaded or being downloaded
    ///
    /// Idempotent and non-blocking:
    /// - no record yet: a final file already in the cache yields a `Complete`
    ///   record; otherwise a `NotStarted` record is created and one fetch scheduled
    /// - `Failed` record: the fetch is restarted from scratch
    /// - any other record: returned unchanged, nothing is scheduled
    ///
    /// The track is also remembered for media-request resolution.
    pub async fn ensure_downloading(&self, track: &Track) -> Result<DownloadRecord> {
        let id = track.id()?;
        let local_path = self
            .locator
            .to_local_path(&track.web_page_url, &track.music_url)?;

        // Probe the cache before taking the registry lock
        let cached = existing_file(&local_path).await?;

        let mut registry = self.registry.lock().await;
        registry.tracks.insert(id.clone(), track.clone());

        if let Some(status) = registry.records.get(&id) {
            let current = status.borrow().clone();
            if current.state != DownloadState::Failed {
                return Ok(current);
            }

            self.check_accepting()?;
            tracing::info!(
                track_id = %id,
                last_error = current.last_error.as_deref(),
                "Restarting failed download"
            );
            status.send_replace(DownloadRecord::not_started(id.clone(), local_path.clone()));
            let snapshot = status.borrow().clone();
            self.schedule(track, Arc::clone(status))?;
            return Ok(snapshot);
        }

        if let Some((len, modified)) = cached {
            let record = cached_record(track, id.clone(), &local_path, len, modified);
            tracing::debug!(track_id = %id, bytes = len, "Serving track from existing cache file");
            let (status, _rx) = watch::channel(record.clone());
            registry.records.insert(id, Arc::new(status));
            return Ok(record);
        }

        self.check_accepting()?;
        let record = DownloadRecord::not_started(id.clone(), local_path);
        let (status, _rx) = watch::channel(record.clone());
        let status = Arc::new(status);
        registry.records.insert(id, Arc::clone(&status));
        self.schedule(track, status)?;

        Ok(record)
    }

    fn check_accepting(&self) -> Result<()> {
        if self.queue_state.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    /// Hand a fetch to the queue processor
    ///
    /// Called with the registry lock held, so at most one job per record is queued.
    fn schedule(&self, track: &Track, status: Arc<watch::Sender<DownloadRecord>>) -> Result<()> {
        let (track_id, local_path) = {
            let record = status.borrow();
            (record.track_id.clone(), record.local_path.clone())
        };

        let job = FetchJob {
            track_id: track_id.clone(),
            music_url: track.music_url.clone(),
            local_path,
            status,
            generation: self
                .queue_state
                .next_generation
                .fetch_add(1, Ordering::SeqCst),
        };

        tracing::debug!(track_id = %track_id, title = %track.title, "Download queued");
        self.emit_event(Event::DownloadQueued {
            track_id,
            title: track.title.clone(),
        });

        self.queue_state
            .job_tx
            .send(job)
            .map_err(|_| Error::ShuttingDown)?;
        self.queue_state
            .fetches_scheduled
            .fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// A `Complete` record for a file left in the cache by an earlier run
fn cached_record(
    track: &Track,
    id: TrackId,
    local_path: &Path,
    len: u64,
    modified: Option<chrono::DateTime<chrono::Utc>>,
) -> DownloadRecord {
    let content_type = track
        .music_content_type
        .clone()
        .unwrap_or_else(|| guess_audio_content_type(local_path).to_string());

    DownloadRecord {
        state: DownloadState::Complete,
        bytes_written: len,
        total_bytes: Some(len),
        content_type: Some(content_type),
        last_modified: track.music_last_modified_date.or(modified),
        ..DownloadRecord::not_started(id, local_path.to_path_buf())
    }
}
