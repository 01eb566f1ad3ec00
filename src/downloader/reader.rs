//! Read access to cached media while it downloads and after it completes.

use crate::error::{Error, Result};
use crate::types::{DownloadRecord, DownloadState, TrackId};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::DownloadManager;

/// A byte source for one track, pinned to the bytes written when it was opened
#[derive(Debug)]
pub struct MediaReader {
    file: File,
    record: DownloadRecord,
}

impl MediaReader {
    /// The record snapshot this reader was opened against
    pub fn record(&self) -> &DownloadRecord {
        &self.record
    }

    /// Bytes that can be read; never grows after opening
    pub fn available(&self) -> u64 {
        self.record.bytes_written
    }

    /// Whether the whole file is on disk
    pub fn is_complete(&self) -> bool {
        self.record.state == DownloadState::Complete
    }

    /// Read `len` bytes starting at `start`, clamped to [`MediaReader::available`]
    pub async fn range(mut self, start: u64, len: u64) -> Result<tokio::io::Take<File>> {
        let available = self.available();
        if start > available {
            return Err(Error::malformed(
                format!("bytes={start}-"),
                format!("range starts beyond the {available} available bytes"),
            ));
        }
        let len = len.min(available - start);
        self.file.seek(SeekFrom::Start(start)).await?;
        Ok(self.file.take(len))
    }
}

impl DownloadManager {
    /// Open a track's cached bytes for reading
    ///
    /// For a running download this opens the `.part` file and exposes exactly the
    /// bytes written so far; for a complete one, the final file. Fails with
    /// [`Error::NotFound`] for unknown tracks, failed downloads, and downloads
    /// that have not written anything yet.
    pub async fn open_for_read(&self, id: &TrackId) -> Result<MediaReader> {
        // A fetch may rename the file between snapshot and open; the second pass
        // sees the new state.
        for _ in 0..2 {
            let record = self
                .get_status(id)
                .await
                .ok_or_else(|| Error::NotFound(format!("track {id}")))?;

            let path = match record.state {
                DownloadState::Complete => record.local_path.clone(),
                DownloadState::InProgress | DownloadState::NotStarted
                    if record.bytes_written > 0 =>
                {
                    record.part_path()
                }
                _ => {
                    return Err(Error::NotFound(format!(
                        "no readable data for track {id} ({})",
                        record.state
                    )));
                }
            };

            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            // A restarted fetch truncates the partial file
            if file.metadata().await?.len() < record.bytes_written {
                continue;
            }

            return Ok(MediaReader { file, record });
        }

        Err(Error::NotFound(format!("track {id} changed while opening")))
    }
}
