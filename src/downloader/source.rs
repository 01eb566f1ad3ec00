//! Upstream media access.

use crate::config::Config;
use crate::error::{Error, FetchError, Result};
use crate::utils::parse_http_date;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;

/// Body of an upstream media response, chunk by chunk
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, FetchError>>;

/// An opened upstream response: headers already received, body still streaming
pub struct MediaResponse {
    /// Declared body length (`Content-Length`)
    pub content_length: Option<u64>,
    /// Declared MIME type (`Content-Type`)
    pub content_type: Option<String>,
    /// Declared modification date (`Last-Modified`)
    pub last_modified: Option<DateTime<Utc>>,
    /// The body
    pub body: ByteStream,
}

impl std::fmt::Debug for MediaResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResponse")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Abstraction over upstream media fetching, enabling testability.
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    /// Open `music_url` and return once response headers are available
    async fn open(&self, music_url: &str) -> std::result::Result<MediaResponse, FetchError>;
}

/// Production [`MediaSource`] backed by a shared `reqwest` client.
pub struct HttpMediaSource {
    client: reqwest::Client,
}

impl HttpMediaSource {
    /// Build a client with the configured user agent and connect timeout
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.cache.connect_timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl MediaSource for HttpMediaSource {
    async fn open(&self, music_url: &str) -> std::result::Result<MediaResponse, FetchError> {
        let response = self.client.get(music_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                url: music_url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let header = |name: reqwest::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE);
        let last_modified =
            header(reqwest::header::LAST_MODIFIED).and_then(|v| parse_http_date(&v));
        let content_length = response.content_length();

        tracing::debug!(
            music_url,
            content_length,
            content_type = content_type.as_deref(),
            "Upstream media opened"
        );

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed();

        Ok(MediaResponse {
            content_length,
            content_type,
            last_modified,
            body,
        })
    }
}
