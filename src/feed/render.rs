//! RSS Renderer: podcast XML for a feed and its download state.
//!
//! Output is RSS 2.0 with the iTunes namespace. Every piece of free text goes
//! through [`crate::escape`] before it is written.

use crate::error::Result;
use crate::escape::escape_str;
use crate::locator::TrackLocator;
use crate::types::{DownloadRecord, DownloadState, Feed, Track, TrackId};
use std::collections::HashMap;

/// Appended to the title of every episode that cannot be played yet
pub const DOWNLOADING_MARKER: &str = " [DOWNLOADING, CAN'T PLAY YET]";

/// Enclosure type when neither upstream nor the page declares one
const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";

/// Render `feed` as podcast RSS
///
/// `records` holds the current download record per track; a track without a
/// record is rendered as not yet playable. Enclosure URLs point at this
/// server's media route.
pub fn render_feed(
    feed: &Feed,
    locator: &TrackLocator,
    records: &HashMap<TrackId, DownloadRecord>,
) -> Result<String> {
    let mut xml = String::with_capacity(1024 + feed.tracks.len() * 768);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<rss version=\"2.0\" xmlns:itunes=\"{ITUNES_NS}\">\n<channel>\n"
    ));

    text_element(&mut xml, 1, "title", &feed.title);
    text_element(&mut xml, 1, "link", &feed.url);
    text_element(
        &mut xml,
        1,
        "description",
        feed.description.as_deref().unwrap_or(&feed.title),
    );
    text_element(&mut xml, 1, "language", &feed.locale);
    text_element(
        &mut xml,
        1,
        "generator",
        concat!("trackcast ", env!("CARGO_PKG_VERSION")),
    );

    if let Some(image) = &feed.image_url {
        xml.push_str("  <image>\n");
        text_element(&mut xml, 2, "url", image);
        text_element(&mut xml, 2, "title", &feed.title);
        text_element(&mut xml, 2, "link", &feed.url);
        xml.push_str("  </image>\n");
        xml.push_str(&format!(
            "  <itunes:image href=\"{}\"/>\n",
            escape_str(image)
        ));
    }

    let author = feed
        .tracks
        .iter()
        .find_map(|t| t.owner_name.as_deref())
        .unwrap_or(&feed.title);
    text_element(&mut xml, 1, "itunes:author", author);

    for track in &feed.tracks {
        let id = track.id()?;
        render_item(&mut xml, feed, track, locator, records.get(&id))?;
    }

    xml.push_str("</channel>\n</rss>\n");
    Ok(xml)
}

/// Episode title as shown to podcast clients
pub fn episode_title(track: &Track, record: Option<&DownloadRecord>) -> String {
    match record {
        Some(r) if r.state == DownloadState::Complete => track.title.clone(),
        _ => format!("{}{}", track.title, DOWNLOADING_MARKER),
    }
}

fn render_item(
    xml: &mut String,
    feed: &Feed,
    track: &Track,
    locator: &TrackLocator,
    record: Option<&DownloadRecord>,
) -> Result<()> {
    let enclosure_url = locator.to_local_url(&feed.url, &track.web_page_url, &track.music_url)?;
    let length = record
        .and_then(|r| r.total_bytes)
        .or(track.music_length_bytes)
        .unwrap_or(0);
    let content_type = record
        .and_then(|r| r.content_type.as_deref())
        .or(track.music_content_type.as_deref())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    xml.push_str("  <item>\n");
    text_element(xml, 2, "title", &episode_title(track, record));
    if let Some(summary) = &track.summary {
        text_element(xml, 2, "description", summary);
    }
    text_element(xml, 2, "link", &track.web_page_url);
    xml.push_str(&format!(
        "    <guid isPermaLink=\"true\">{}</guid>\n",
        escape_str(&track.web_page_url)
    ));
    if let Some(date) = track.music_last_modified_date {
        text_element(xml, 2, "pubDate", &date.to_rfc2822());
    }
    xml.push_str(&format!(
        "    <enclosure url=\"{}\" length=\"{}\" type=\"{}\"/>\n",
        escape_str(enclosure_url.as_str()),
        length,
        escape_str(content_type)
    ));
    if let Some(owner) = &track.owner_name {
        text_element(xml, 2, "itunes:author", owner);
    }
    xml.push_str("  </item>\n");
    Ok(())
}

fn text_element(xml: &mut String, depth: usize, name: &str, text: &str) {
    xml.push_str(&"  ".repeat(depth));
    xml.push_str(&format!("<{name}>{}</{name}>\n", escape_str(text)));
}
