//! Core types for trackcast

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Number of hex characters in a [`TrackId`]
pub const TRACK_ID_LEN: usize = 32;

/// Stable identity of one piece of upstream media
///
/// Derived from the track's upstream music URL, so repeated scrapes of the same
/// feed produce the same identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Derive the identity of the media at `music_url`
    pub fn for_music_url(music_url: &url::Url) -> Self {
        let digest = Sha256::digest(music_url.as_str().as_bytes());
        Self(hex_prefix(&digest, TRACK_ID_LEN))
    }

    /// Parse an identity previously produced by [`TrackId::for_music_url`]
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() == TRACK_ID_LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::malformed(
                s,
                format!("track id must be {TRACK_ID_LEN} lowercase hex characters"),
            ))
        }
    }

    /// The identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hex of the first `len / 2` bytes of `bytes`
pub(crate) fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for b in bytes.iter().take(len.div_ceil(2)) {
        out.push_str(&format!("{b:02x}"));
    }
    out.truncate(len);
    out
}

/// One upstream track as scraped from a feed page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Track {
    /// Track title
    pub title: String,
    /// Short description
    pub summary: Option<String>,
    /// Upstream page of this track
    pub web_page_url: String,
    /// Upstream audio location
    pub music_url: String,
    /// Upstream-reported MIME type
    pub music_content_type: Option<String>,
    /// Upstream-reported size in bytes
    pub music_length_bytes: Option<u64>,
    /// Upstream publication or modification date
    pub music_last_modified_date: Option<DateTime<Utc>>,
    /// Artist or channel owner
    pub owner_name: Option<String>,
}

impl Track {
    /// Create a track from its required fields
    ///
    /// Both URLs must be absolute http(s) URLs and the title must not be blank.
    pub fn new(
        title: impl Into<String>,
        web_page_url: impl Into<String>,
        music_url: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        let web_page_url = web_page_url.into();
        let music_url = music_url.into();

        if title.trim().is_empty() {
            return Err(Error::malformed(title, "track title is empty"));
        }
        parse_http_url(&web_page_url)?;
        parse_http_url(&music_url)?;

        Ok(Self {
            title,
            summary: None,
            web_page_url,
            music_url,
            music_content_type: None,
            music_length_bytes: None,
            music_last_modified_date: None,
            owner_name: None,
        })
    }

    /// Identity of this track
    pub fn id(&self) -> Result<TrackId> {
        Ok(TrackId::for_music_url(&parse_http_url(&self.music_url)?))
    }
}

/// A scraped feed; produced fresh per scrape and never persisted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Feed {
    /// Upstream page the feed was scraped from
    pub url: String,
    /// Channel title
    pub title: String,
    /// Channel artwork
    pub image_url: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Language tag, e.g. "en" or "en-US"
    pub locale: String,
    /// Tracks in page order
    pub tracks: Vec<Track>,
}

impl Feed {
    /// Create an empty feed for `url` with the given title
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let title = title.into();
        parse_http_url(&url)?;
        if title.trim().is_empty() {
            return Err(Error::malformed(title, "feed title is empty"));
        }
        Ok(Self {
            url,
            title,
            image_url: None,
            description: None,
            locale: "en".to_string(),
            tracks: vec![],
        })
    }
}

/// Parse `input` as an absolute http(s) URL
pub fn parse_http_url(input: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(input).map_err(|e| Error::malformed(input, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(Error::malformed(input, "expected an absolute http(s) URL")),
    }
}

/// Download lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Scheduled, waiting for a worker
    NotStarted,
    /// Bytes are being appended
    InProgress,
    /// Every byte is on disk and the file is closed
    Complete,
    /// The last fetch failed; the next access restarts it
    Failed,
}

impl DownloadState {
    /// Whether a fetch is scheduled or running
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::NotStarted | DownloadState::InProgress)
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownloadState::NotStarted => "not_started",
            DownloadState::InProgress => "in_progress",
            DownloadState::Complete => "complete",
            DownloadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one track's download status
///
/// Only the download manager produces these; every reader receives a consistent
/// copy in which `state` and `bytes_written` belong together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DownloadRecord {
    /// Track identity
    pub track_id: TrackId,
    /// Lifecycle state
    pub state: DownloadState,
    /// Bytes durably appended so far
    pub bytes_written: u64,
    /// Upstream-declared size, once known
    pub total_bytes: Option<u64>,
    /// Final location of the media file
    #[schema(value_type = String)]
    pub local_path: PathBuf,
    /// Upstream MIME type, once known
    pub content_type: Option<String>,
    /// Upstream `Last-Modified`, once known
    pub last_modified: Option<DateTime<Utc>>,
    /// Why the last fetch failed
    ///
    /// For logs and the status API only; never sent to media clients.
    pub last_error: Option<String>,
    /// When the current fetch was scheduled
    pub started_at: DateTime<Utc>,
}

impl DownloadRecord {
    /// A fresh record for a fetch that has just been scheduled
    pub fn not_started(track_id: TrackId, local_path: PathBuf) -> Self {
        Self {
            track_id,
            state: DownloadState::NotStarted,
            bytes_written: 0,
            total_bytes: None,
            local_path,
            content_type: None,
            last_modified: None,
            last_error: None,
            started_at: Utc::now(),
        }
    }

    /// Location bytes are appended to while the download runs
    pub fn part_path(&self) -> PathBuf {
        part_path_for(&self.local_path)
    }
}

/// In-progress sibling of a final media path (`<path>.part`)
pub(crate) fn part_path_for(path: &std::path::Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A fetch was scheduled
    DownloadQueued {
        /// Track identity
        track_id: TrackId,
        /// Track title
        title: String,
    },

    /// A worker started the fetch
    DownloadStarted {
        /// Track identity
        track_id: TrackId,
        /// Upstream-declared size, if sent
        total_bytes: Option<u64>,
    },

    /// Progress update
    DownloadProgress {
        /// Track identity
        track_id: TrackId,
        /// Bytes on disk
        bytes_written: u64,
        /// Upstream-declared size, if sent
        total_bytes: Option<u64>,
    },

    /// Every byte is on disk
    DownloadComplete {
        /// Track identity
        track_id: TrackId,
        /// Final size
        total_bytes: u64,
    },

    /// The fetch failed
    DownloadFailed {
        /// Track identity
        track_id: TrackId,
        /// Failure description
        error: String,
    },

    /// The cache became unusable; the process should stop
    CacheFailure {
        /// Failure description
        error: String,
    },

    /// The download manager is shutting down
    Shutdown,
}

impl Event {
    /// Short name used as the SSE event type
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DownloadQueued { .. } => "download_queued",
            Event::DownloadStarted { .. } => "download_started",
            Event::DownloadProgress { .. } => "download_progress",
            Event::DownloadComplete { .. } => "download_complete",
            Event::DownloadFailed { .. } => "download_failed",
            Event::CacheFailure { .. } => "cache_failure",
            Event::Shutdown => "shutdown",
        }
    }
}
