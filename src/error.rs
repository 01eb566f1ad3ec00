//! Error types for trackcast
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] - crate-wide error with HTTP status mapping
//! - [`ScrapeError`] - the upstream feed page could not be turned into a feed
//! - [`FetchError`] - a single track's download failed (network or disk)
//! - [`ApiError`] - JSON error body returned by the HTTP API

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for trackcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for trackcast
#[derive(Debug, Error)]
pub enum Error {
    /// An input URL or media path is not well-formed
    #[error("malformed input {input:?}: {reason}")]
    MalformedInput {
        /// The offending input, as received
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// The upstream feed page could not be scraped
    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),

    /// A track download failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Unknown track, feed or record
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cache.cache_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// The cache directory cannot be written (disk full, permissions)
    #[error("cache unavailable at {path}: {reason}")]
    CacheUnavailable {
        /// The cache location that failed
        path: PathBuf,
        /// The underlying reason
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::MalformedInput`] for the given input
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced while scraping an upstream feed page
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The page could not be fetched at all
    #[error("feed page {url} is unreachable: {reason}")]
    Unreachable {
        /// The page URL
        url: String,
        /// The transport error
        reason: String,
    },

    /// The page answered with a non-success status
    #[error("feed page {url} returned HTTP {status}")]
    UpstreamStatus {
        /// The page URL
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// The page was fetched but its structure was not recognized
    #[error("feed page {url} has an unrecognized structure: {reason}")]
    UnrecognizedPage {
        /// The page URL
        url: String,
        /// What was missing or unparsable
        reason: String,
    },
}

/// Errors produced while downloading a single track
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream answered with a non-success status
    #[error("upstream returned HTTP {status} for {url}")]
    UpstreamStatus {
        /// The media URL
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// Connection or transfer failure
    #[error("network error: {0}")]
    Network(String),

    /// No bytes arrived within the read timeout
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    /// Upstream closed the connection before the declared length was reached
    #[error("upstream closed the connection after {written} of {expected} bytes")]
    Truncated {
        /// Bytes written to disk
        written: u64,
        /// Bytes upstream declared
        expected: u64,
    },

    /// Upstream sent more bytes than it declared
    #[error("upstream sent more than the declared {expected} bytes")]
    Overrun {
        /// Bytes upstream declared
        expected: u64,
    },

    /// Local disk failure
    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    /// The fetch was abandoned because the process is shutting down
    #[error("download abandoned at shutdown")]
    Abandoned,
}

impl FetchError {
    /// Whether this failure means the cache itself is unusable.
    ///
    /// Only resource exhaustion is fatal to the process; every other failure
    /// is confined to the one track.
    pub fn is_fatal(&self) -> bool {
        match self {
            FetchError::Disk(e) => matches!(
                e.kind(),
                std::io::ErrorKind::StorageFull
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::ReadOnlyFilesystem
            ),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "not found: track 0123…",
///     "details": { "track_id": "0123…" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "malformed_input")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create a "service unavailable" error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::MalformedInput { .. } => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 502 Bad Gateway - upstream failures
            Error::Scrape(_) => 502,
            Error::Fetch(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::CacheUnavailable { .. } => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::MalformedInput { .. } => "malformed_input",
            Error::Scrape(e) => match e {
                ScrapeError::Unreachable { .. } => "feed_unreachable",
                ScrapeError::UpstreamStatus { .. } => "feed_upstream_status",
                ScrapeError::UnrecognizedPage { .. } => "feed_unrecognized",
            },
            Error::Fetch(_) => "fetch_error",
            Error::NotFound(_) => "not_found",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::CacheUnavailable { .. } => "cache_unavailable",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();

        // Server-side failures keep their diagnostics in the logs
        let message = match error.status_code() {
            500 => "internal server error".to_string(),
            _ => error.to_string(),
        };

        let details = match &error {
            Error::MalformedInput { input, .. } => Some(serde_json::json!({
                "input": input,
            })),
            Error::Scrape(
                ScrapeError::Unreachable { url, .. }
                | ScrapeError::UnrecognizedPage { url, .. },
            ) => Some(serde_json::json!({
                "feed_url": url,
            })),
            Error::Scrape(ScrapeError::UpstreamStatus { url, status }) => {
                Some(serde_json::json!({
                    "feed_url": url,
                    "upstream_status": status,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
