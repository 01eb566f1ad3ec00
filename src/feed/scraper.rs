//! Feed Scraper: turns an upstream artist/channel page into a [`Feed`].
//!
//! Channel metadata comes from OpenGraph `<meta property="og:*">` tags, falling
//! back to `<title>` and `<html lang>`. Tracks come from schema.org JSON-LD
//! blocks: a `MusicGroup`, `MusicPlaylist` or `MusicAlbum` with a `track` list,
//! or an `ItemList` of `MusicRecording`s.

use crate::config::Config;
use crate::error::{Error, Result, ScrapeError};
use crate::escape::unescape_str;
use crate::types::{Feed, Track, parse_http_url};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Schema.org types whose `track` property lists recordings
const TRACK_CONTAINERS: [&str; 3] = ["MusicGroup", "MusicPlaylist", "MusicAlbum"];

/// Abstraction over feed page scraping, enabling testability.
#[async_trait::async_trait]
pub trait FeedScraper: Send + Sync {
    /// Fetch and parse the page at `feed_page_url`
    async fn scrape(&self, feed_page_url: &str) -> std::result::Result<Feed, ScrapeError>;
}

/// Production [`FeedScraper`] that fetches pages over HTTP
pub struct HtmlFeedScraper {
    /// HTTP client for fetching pages
    http_client: reqwest::Client,
}

impl HtmlFeedScraper {
    /// Create a scraper with the configured user agent and timeouts
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.cache.connect_timeout)
            .timeout(config.cache.connect_timeout + config.cache.read_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait::async_trait]
impl FeedScraper for HtmlFeedScraper {
    async fn scrape(&self, feed_page_url: &str) -> std::result::Result<Feed, ScrapeError> {
        debug!(feed_url = feed_page_url, "Scraping feed page");

        let unreachable = |reason: String| ScrapeError::Unreachable {
            url: feed_page_url.to_string(),
            reason,
        };

        let url = parse_http_url(feed_page_url).map_err(|e| unreachable(e.to_string()))?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        // Check HTTP status before trying to parse the response body
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::UpstreamStatus {
                url: feed_page_url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let feed = parse_page(feed_page_url, &html)?;
        debug!(
            feed_url = feed_page_url,
            tracks = feed.tracks.len(),
            "Feed page parsed"
        );
        Ok(feed)
    }
}

/// Parse a fetched page into a feed
///
/// Tracks are returned in page order; duplicates (same audio URL) are dropped
/// and entries missing a title or audio URL are skipped.
pub fn parse_page(page_url: &str, html: &str) -> std::result::Result<Feed, ScrapeError> {
    let unrecognized = |reason: &str| ScrapeError::UnrecognizedPage {
        url: page_url.to_string(),
        reason: reason.to_string(),
    };

    let base = url::Url::parse(page_url).map_err(|e| unrecognized(&e.to_string()))?;
    let meta = og_meta(html);
    let nodes = json_ld_nodes(html);

    let group_name = nodes
        .iter()
        .find(|n| TRACK_CONTAINERS.iter().any(|t| has_type(n, t)))
        .and_then(|n| text_field(n, "name"));

    let title = meta
        .get("og:title")
        .cloned()
        .or_else(|| page_title(html))
        .or_else(|| group_name.clone())
        .ok_or_else(|| unrecognized("no title"))?;

    let mut feed = Feed::new(page_url, title).map_err(|e| unrecognized(&e.to_string()))?;
    feed.image_url = meta.get("og:image").and_then(|u| resolve(&base, u));
    feed.description = meta.get("og:description").cloned();
    if let Some(locale) = meta
        .get("og:locale")
        .map(|l| l.replace('_', "-"))
        .or_else(|| html_lang(html))
    {
        feed.locale = locale;
    }

    let default_owner = group_name.or_else(|| meta.get("og:site_name").cloned());
    let mut seen = HashSet::new();
    for (index, recording) in recordings(&nodes).into_iter().enumerate() {
        match parse_recording(&base, recording, index, default_owner.as_deref()) {
            Some(track) => {
                if seen.insert(track.music_url.clone()) {
                    feed.tracks.push(track);
                }
            }
            None => debug!(feed_url = page_url, index, "Skipping unusable track entry"),
        }
    }

    if feed.tracks.is_empty() {
        return Err(unrecognized("no track data"));
    }

    Ok(feed)
}

// Patterns are literals; compiling them cannot fail at runtime
#[allow(clippy::expect_used)]
static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern"));
#[allow(clippy::expect_used)]
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern")
});
#[allow(clippy::expect_used)]
static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern"));
#[allow(clippy::expect_used)]
static HTML_LANG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<html\b[^>]*\blang\s*=\s*["']([^"']+)["']"#).expect("lang pattern")
});
#[allow(clippy::expect_used)]
static JSON_LD_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("json-ld pattern")
});

/// `og:*` (and `og:site_name`) meta tags, values unescaped
fn og_meta(html: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for tag in META_TAG.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for cap in ATTRIBUTE.captures_iter(tag.as_str()) {
            let name = cap[1].to_ascii_lowercase();
            let value = cap.get(2).or_else(|| cap.get(3)).map(|m| m.as_str());
            match (name.as_str(), value) {
                ("property" | "name", Some(v)) if v.starts_with("og:") => {
                    key = Some(v.to_ascii_lowercase())
                }
                ("content", Some(v)) => content = Some(unescape_str(v.trim())),
                _ => {}
            }
        }
        if let (Some(key), Some(content)) = (key, content) {
            if !content.is_empty() {
                out.entry(key).or_insert(content);
            }
        }
    }
    out
}

fn page_title(html: &str) -> Option<String> {
    TITLE_TAG
        .captures(html)
        .map(|c| unescape_str(c[1].trim()))
        .filter(|t| !t.is_empty())
}

fn html_lang(html: &str) -> Option<String> {
    HTML_LANG
        .captures(html)
        .map(|c| c[1].trim().to_string())
}

/// Every JSON object found in ld+json blocks, including `@graph` members
fn json_ld_nodes(html: &str) -> Vec<Value> {
    let mut nodes = Vec::new();
    for cap in JSON_LD_SCRIPT.captures_iter(html) {
        match serde_json::from_str::<Value>(cap[1].trim()) {
            Ok(value) => flatten_nodes(value, &mut nodes),
            Err(e) => warn!(error = %e, "Ignoring malformed JSON-LD block"),
        }
    }
    nodes
}

fn flatten_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_nodes(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_nodes(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn has_type(node: &Value, wanted: &str) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

/// Recording nodes in page order
fn recordings(nodes: &[Value]) -> Vec<&Value> {
    let mut out = Vec::new();
    for node in nodes {
        if TRACK_CONTAINERS.iter().any(|t| has_type(node, t)) {
            if let Some(tracks) = node.get("track") {
                collect_list(tracks, &mut out);
            }
        } else if has_type(node, "ItemList") {
            if let Some(items) = node.get("itemListElement") {
                collect_list(items, &mut out);
            }
        } else if has_type(node, "MusicRecording") {
            out.push(node);
        }
    }
    out
}

/// Accepts a plain array, an `ItemList`, or `ListItem { item }` wrappers
fn collect_list<'a>(list: &'a Value, out: &mut Vec<&'a Value>) {
    match list {
        Value::Array(items) => {
            for item in items {
                match item.get("item") {
                    Some(inner) if has_type(item, "ListItem") => out.push(inner),
                    _ => out.push(item),
                }
            }
        }
        Value::Object(_) => {
            if let Some(items) = list.get("itemListElement") {
                collect_list(items, out);
            } else {
                out.push(list);
            }
        }
        _ => {}
    }
}

fn parse_recording(
    base: &url::Url,
    node: &Value,
    index: usize,
    default_owner: Option<&str>,
) -> Option<Track> {
    let title = text_field(node, "name")?;
    let audio = node.get("audio");
    let music_url = audio
        .and_then(|a| match a {
            Value::String(s) => Some(s.clone()),
            _ => text_field(a, "contentUrl"),
        })
        .or_else(|| text_field(node, "contentUrl"))
        .and_then(|u| resolve(base, &u))?;
    let web_page_url = text_field(node, "url")
        .and_then(|u| resolve(base, &u))
        .unwrap_or_else(|| format!("{base}#track-{}", index + 1));

    let mut track = Track::new(title, web_page_url, music_url).ok()?;
    track.summary = text_field(node, "description");
    track.owner_name = artist_name(node).or_else(|| default_owner.map(str::to_string));
    track.music_last_modified_date = text_field(node, "datePublished")
        .or_else(|| text_field(node, "dateModified"))
        .and_then(|d| parse_date(&d));
    if let Some(audio) = audio {
        track.music_content_type = text_field(audio, "encodingFormat").map(|f| mime_type(&f));
        track.music_length_bytes = audio.get("contentSize").and_then(content_size);
    }
    Some(track)
}

fn text_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(|s| unescape_str(s.trim()))
        .filter(|s| !s.is_empty())
}

fn artist_name(node: &Value) -> Option<String> {
    match node.get("byArtist")? {
        Value::String(s) => Some(unescape_str(s.trim())).filter(|s| !s.is_empty()),
        Value::Array(artists) => artists.iter().find_map(|a| text_field(a, "name")),
        artist => text_field(artist, "name"),
    }
}

fn resolve(base: &url::Url, href: &str) -> Option<String> {
    let joined = base.join(href).ok()?;
    parse_http_url(joined.as_str()).ok().map(String::from)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc2822(value)
                .map(|d| d.with_timezone(&Utc))
                .ok()
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|d| d.and_utc())
        })
}

/// `"mp3"` and friends become MIME types; MIME types pass through
fn mime_type(format: &str) -> String {
    if format.contains('/') {
        return format.to_ascii_lowercase();
    }
    let as_path = std::path::PathBuf::from(format!("audio.{format}"));
    crate::utils::guess_audio_content_type(&as_path).to_string()
}

fn content_size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
