//! Feed handlers: scrape an upstream page and render it as podcast RSS.

use super::FeedQuery;
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::feed::publish;
use crate::types::parse_http_url;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};

/// Content type of rendered feeds
pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// GET /feeds/:name - Rendered RSS for a configured feed
#[utoipa::path(
    get,
    path = "/feeds/{name}",
    tag = "feeds",
    params(
        ("name" = String, Path, description = "Configured feed name")
    ),
    responses(
        (status = 200, description = "Podcast RSS", content_type = "application/rss+xml"),
        (status = 404, description = "No feed with this name", body = crate::error::ApiError),
        (status = 502, description = "Upstream page could not be scraped", body = crate::error::ApiError)
    )
)]
pub async fn get_named_feed(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response> {
    let feed = state
        .config
        .feed(&name)
        .ok_or_else(|| Error::NotFound(format!("feed {name}")))?;
    render(&state, &feed.url).await
}

/// GET /feed?url= - Rendered RSS for an arbitrary upstream page
#[utoipa::path(
    get,
    path = "/feed",
    tag = "feeds",
    params(FeedQuery),
    responses(
        (status = 200, description = "Podcast RSS", content_type = "application/rss+xml"),
        (status = 400, description = "Malformed page URL", body = crate::error::ApiError),
        (status = 404, description = "Arbitrary feeds are disabled", body = crate::error::ApiError),
        (status = 502, description = "Upstream page could not be scraped", body = crate::error::ApiError)
    )
)]
pub async fn get_feed_by_url(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response> {
    if !state.config.server.allow_arbitrary_feeds {
        return Err(Error::NotFound("feed".into()));
    }
    parse_http_url(&query.url)?;
    render(&state, &query.url).await
}

async fn render(state: &AppState, page_url: &str) -> Result<Response> {
    let feed = state.scraper.scrape(page_url).await.map_err(|e| {
        tracing::warn!(feed_url = page_url, error = %e, "Feed scrape failed");
        Error::from(e)
    })?;
    let xml = publish(&state.manager, &feed).await?;

    tracing::info!(
        feed_url = page_url,
        tracks = feed.tracks.len(),
        "Served feed"
    );
    Ok(([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], xml).into_response())
}
