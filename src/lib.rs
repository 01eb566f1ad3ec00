//! # trackcast
//!
//! Republishes artist pages as podcast feeds.
//!
//! A feed request scrapes the upstream page, schedules every track for download
//! into a local cache, and renders RSS whose enclosures point back at this
//! server. Media requests are answered from the cache while downloads are still
//! running, so a podcast client can start playing before a track is complete.
//!
//! ## Quick Start
//!
//! ```no_run
//! use trackcast::{Config, DownloadManager, HtmlFeedScraper, api};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let manager = DownloadManager::new(config.clone()).await?;
//!     let scraper = Arc::new(HtmlFeedScraper::new(&config)?);
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let state = api::AppState::new(manager.clone(), scraper);
//!     api::start_server(state, async { tokio::signal::ctrl_c().await.ok(); }).await?;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP server: feeds, media and status API
pub mod api;
/// Configuration types
pub mod config;
/// Download manager and media cache
pub mod downloader;
/// Error types
pub mod error;
/// XML entity escaping
pub mod escape;
/// Feed scraping and RSS rendering
pub mod feed;
/// Local URLs and cache paths for tracks
pub mod locator;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{CacheConfig, Config, FeedConfig, RetryConfig, ServerConfig};
pub use downloader::{DownloadManager, HttpMediaSource, MediaReader, MediaSource};
pub use error::{ApiError, Error, ErrorDetail, FetchError, Result, ScrapeError, ToHttpStatus};
pub use feed::{FeedScraper, HtmlFeedScraper, render_feed};
pub use locator::TrackLocator;
pub use types::{DownloadRecord, DownloadState, Event, Feed, Track, TrackId};

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long open HTTP connections may take to finish once shutdown starts
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the HTTP server and download manager until a termination signal
/// arrives or the cache becomes unusable.
///
/// - On SIGTERM/SIGINT the server stops accepting connections, the download
///   manager shuts down, and `Ok(())` is returned.
/// - When a download hits resource exhaustion (disk full, cache not writable)
///   the same shutdown happens and [`Error::CacheUnavailable`] is returned.
///
/// # Example
///
/// ```no_run
/// use trackcast::{Config, run};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     run(Config::default()).await?;
///     Ok(())
/// }
/// ```
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let manager = DownloadManager::new(config.clone()).await?;
    let scraper = Arc::new(HtmlFeedScraper::new(&config)?);
    let state = api::AppState::new(manager.clone(), scraper);
    let fatal = manager.fatal_signal();
    let stop = CancellationToken::new();

    let mut server = tokio::spawn(api::start_server(state, stop.clone().cancelled_owned()));

    let outcome = tokio::select! {
        _ = wait_for_signal() => Ok(()),
        _ = fatal.cancelled() => {
            tracing::error!(
                cache_dir = %config.cache.cache_dir.display(),
                "Cache is unusable, stopping"
            );
            Err(Error::CacheUnavailable {
                path: config.cache.cache_dir.clone(),
                reason: "a download exhausted the cache storage".into(),
            })
        }
        joined = &mut server => {
            manager.shutdown().await;
            return match joined {
                Ok(result) => result,
                Err(e) => Err(Error::ApiServerError(e.to_string())),
            };
        }
    };

    stop.cancel();
    manager.shutdown().await;

    match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, &mut server).await {
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "HTTP server stopped with an error"),
        Ok(_) => {}
        Err(_) => {
            tracing::warn!("HTTP connections still open after shutdown, closing them");
            server.abort();
        }
    }

    outcome
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
