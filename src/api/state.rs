//! Application state for the HTTP server

use crate::Config;
use crate::downloader::DownloadManager;
use crate::feed::FeedScraper;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Owns every download record and the media cache
    pub manager: DownloadManager,

    /// Turns upstream pages into feeds
    pub scraper: Arc<dyn FeedScraper>,

    /// Configuration the manager was started with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState sharing the manager's configuration
    pub fn new(manager: DownloadManager, scraper: Arc<dyn FeedScraper>) -> Self {
        let config = manager.get_config();
        Self {
            manager,
            scraper,
            config,
        }
    }
}
