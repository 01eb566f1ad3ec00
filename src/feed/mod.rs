//! Feed scraping and podcast rendering
//!
//! - [`scraper`] turns an upstream artist page into a [`Feed`]
//! - [`render`] turns a [`Feed`] plus download state into podcast RSS
//!
//! [`publish`] ties both to the [`DownloadManager`].

pub mod render;
pub mod scraper;

pub use render::{DOWNLOADING_MARKER, render_feed};
pub use scraper::{FeedScraper, HtmlFeedScraper};

use crate::downloader::DownloadManager;
use crate::error::Result;
use crate::types::Feed;
use std::collections::HashMap;

/// Render `feed` as RSS, registering its tracks with `manager` first
///
/// Every track is remembered so its media URL resolves. With
/// `cache.prefetch_on_render` set, every track is also scheduled for download;
/// a track that cannot be scheduled is rendered with whatever status it has.
pub async fn publish(manager: &DownloadManager, feed: &Feed) -> Result<String> {
    let prefetch = manager.get_config().cache.prefetch_on_render;
    let mut records = HashMap::with_capacity(feed.tracks.len());

    for track in &feed.tracks {
        let id = manager.remember(&feed.url, track).await?;
        if prefetch {
            if let Err(e) = manager.ensure_downloading(track).await {
                tracing::warn!(track_id = %id, error = %e, "Could not schedule track download");
            }
        }
        if let Some(record) = manager.get_status(&id).await {
            records.insert(id, record);
        }
    }

    tracing::debug!(
        feed_url = %feed.url,
        tracks = feed.tracks.len(),
        "Rendering feed"
    );
    render_feed(feed, manager.locator(), &records)
}
