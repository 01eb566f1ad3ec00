//! Track Locator: maps upstream media locations to local proxy locations
//!
//! Pure string/URL construction; no network or disk access. For a track the
//! locator derives:
//!
//! - a local URL: `{public_url}/media/{feed_key}/{track_id}/{file_name}`
//! - a cache path: `{cache_dir}/{track_id[..2]}/{track_id}/{file_name}`
//!
//! `track_id` hashes the upstream music URL, so tracks whose upstream files share
//! a name never collide. `feed_key` scopes the URL to the feed it was published in.

use crate::error::{Error, Result};
use crate::types::{TrackId, hex_prefix, parse_http_url};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Number of hex characters in a feed key
pub const FEED_KEY_LEN: usize = 12;

/// Route prefix served by the media handler
pub const MEDIA_PREFIX: &str = "media";

/// Fallback file name when the upstream URL has no usable last segment
const DEFAULT_FILE_NAME: &str = "audio";

/// Maximum length of a sanitized file name
const MAX_FILE_NAME_LEN: usize = 120;

/// Derives local URLs and cache paths for tracks
#[derive(Clone, Debug)]
pub struct TrackLocator {
    public_url: url::Url,
    cache_dir: PathBuf,
}

impl TrackLocator {
    /// Create a locator serving under `public_url` and storing under `cache_dir`
    pub fn new(public_url: &str, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut public_url = parse_http_url(public_url)?;
        // Keep the base path intact when joining: "http://h/base" -> "http://h/base/"
        if !public_url.path().ends_with('/') {
            let path = format!("{}/", public_url.path());
            public_url.set_path(&path);
        }
        public_url.set_query(None);
        public_url.set_fragment(None);

        Ok(Self {
            public_url,
            cache_dir: cache_dir.into(),
        })
    }

    /// The cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local, HTTP-servable URL for a track of the feed at `feed_url`
    pub fn to_local_url(
        &self,
        feed_url: &str,
        web_page_url: &str,
        music_url: &str,
    ) -> Result<url::Url> {
        let feed = parse_http_url(feed_url)?;
        parse_http_url(web_page_url)?;
        let music = parse_http_url(music_url)?;

        let relative = format!(
            "{}/{}/{}/{}",
            MEDIA_PREFIX,
            feed_key(&feed),
            TrackId::for_music_url(&music),
            file_name(&music)
        );

        self.public_url
            .join(&relative)
            .map_err(|e| Error::malformed(relative, e.to_string()))
    }

    /// Cache location of a track's media file
    pub fn to_local_path(&self, web_page_url: &str, music_url: &str) -> Result<PathBuf> {
        parse_http_url(web_page_url)?;
        let music = parse_http_url(music_url)?;
        let id = TrackId::for_music_url(&music);
        Ok(self.path_for(&id, &file_name(&music)))
    }

    /// Cache location for an already-derived identity and file name
    pub fn path_for(&self, id: &TrackId, file_name: &str) -> PathBuf {
        self.cache_dir
            .join(&id.as_str()[..2])
            .join(id.as_str())
            .join(file_name)
    }

    /// Inverse of [`TrackLocator::to_local_url`] for the path segments after `/media/`
    ///
    /// Validates every segment's shape and returns the track identity.
    pub fn parse_media_path(&self, feed_key: &str, track_id: &str, file: &str) -> Result<TrackId> {
        let valid_key = feed_key.len() == FEED_KEY_LEN
            && feed_key
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid_key {
            return Err(Error::malformed(feed_key, "invalid feed key"));
        }
        if file.is_empty() || sanitize_file_name(file) != file {
            return Err(Error::malformed(file, "invalid media file name"));
        }
        TrackId::parse(track_id)
    }
}

/// Short, stable key for a feed URL
pub fn feed_key(feed_url: &url::Url) -> String {
    let digest = Sha256::digest(feed_url.as_str().as_bytes());
    hex_prefix(&digest, FEED_KEY_LEN)
}

/// Sanitized last path segment of an upstream media URL
pub fn file_name(music_url: &url::Url) -> String {
    let last = music_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());
    sanitize_file_name(&decoded)
}

fn sanitize_file_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    // No hidden files, no "." or ".."
    while out.starts_with('.') {
        out.remove(0);
    }
    if out.is_empty() {
        out = DEFAULT_FILE_NAME.to_string();
    }
    out
}
