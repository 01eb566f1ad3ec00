//! Media handler: serves cached track bytes while they download and after.
//!
//! Never waits for a fetch. A request whose first byte is not on disk yet gets
//! `503` with `Retry-After`; everything else is answered from the bytes that
//! are readable at the moment the file is opened.

use crate::api::AppState;
use crate::api::range::{RangePlan, parse_range, plan};
use crate::error::{ApiError, Error, Result};
use crate::types::{DownloadRecord, DownloadState, Track, TrackId};
use crate::utils::{format_http_date, guess_audio_content_type, parse_http_date};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

/// GET/HEAD /media/:feed_key/:track_id/:file_name - Cached track media
#[utoipa::path(
    get,
    path = "/media/{feed_key}/{track_id}/{file_name}",
    tag = "media",
    params(
        ("feed_key" = String, Path, description = "Key of the feed the track was published in"),
        ("track_id" = String, Path, description = "Track identity"),
        ("file_name" = String, Path, description = "Media file name")
    ),
    responses(
        (status = 200, description = "Complete media file"),
        (status = 206, description = "Requested or available byte range"),
        (status = 304, description = "Not modified since If-Modified-Since"),
        (status = 400, description = "Malformed media path", body = ApiError),
        (status = 404, description = "Unknown track", body = ApiError),
        (status = 416, description = "Range outside the complete file"),
        (status = 500, description = "Download failed", body = ApiError),
        (status = 503, description = "Requested bytes are not downloaded yet", body = ApiError)
    )
)]
pub async fn get_media(
    State(state): State<AppState>,
    Path((feed_key, track_id, file_name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let id = state
        .manager
        .locator()
        .parse_media_path(&feed_key, &track_id, &file_name)?;
    let track = state
        .manager
        .track(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("track {id}")))?;

    if let Some(failed) = state
        .manager
        .get_status(&id)
        .await
        .filter(|r| r.state == DownloadState::Failed)
    {
        return Ok(failed_response(&state, &track, &failed).await);
    }

    state.manager.ensure_downloading(&track).await?;

    let reader = match state.manager.open_for_read(&id).await {
        Ok(reader) => reader,
        Err(Error::NotFound(_)) => return Ok(not_ready(&state, &id)),
        Err(e) => return Err(e),
    };
    let record = reader.record().clone();
    let complete = reader.is_complete();
    let available = reader.available();
    let total = if complete {
        Some(available)
    } else {
        record.total_bytes
    };

    if complete && not_modified_since(&headers, &record) {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        insert_last_modified(&mut response, &record);
        return Ok(response);
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    let (status, start, end) = if complete && range.is_none() {
        (StatusCode::OK, 0, available.saturating_sub(1))
    } else {
        match plan(range, available, total) {
            RangePlan::Serve { start, end } => (StatusCode::PARTIAL_CONTENT, start, end),
            RangePlan::NotYet => return Ok(not_ready(&state, &id)),
            RangePlan::Unsatisfiable => return Ok(unsatisfiable(total)),
        }
    };
    let len = if available == 0 { 0 } else { end - start + 1 };

    tracing::debug!(
        track_id = %id,
        state = %record.state,
        start,
        len,
        available,
        "Serving media"
    );

    let body = reader.range(start, len).await?;
    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type(&track, &record))
        .header(header::CONTENT_LENGTH, len)
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(ReaderStream::new(body)))
        .map_err(|e| Error::ApiServerError(e.to_string()))?;

    if status == StatusCode::PARTIAL_CONTENT {
        let complete_length = total.map_or_else(|| "*".to_string(), |t| t.to_string());
        insert_header(
            response.headers_mut(),
            header::CONTENT_RANGE,
            &format!("bytes {start}-{end}/{complete_length}"),
        );
    }
    if complete {
        insert_last_modified(&mut response, &record);
    } else {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    Ok(response)
}

/// Answer for a failed download: generic 500, details to the log, fetch restarted
async fn failed_response(state: &AppState, track: &Track, record: &DownloadRecord) -> Response {
    tracing::warn!(
        track_id = %record.track_id,
        error = record.last_error.as_deref().unwrap_or("unknown"),
        "Media requested for failed download; restarting it"
    );
    if let Err(e) = state.manager.ensure_downloading(track).await {
        tracing::warn!(track_id = %record.track_id, error = %e, "Could not restart download");
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::internal("media is unavailable")),
    )
        .into_response()
}

fn not_ready(state: &AppState, id: &TrackId) -> Response {
    tracing::debug!(track_id = %id, "Requested media not on disk yet");
    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError::service_unavailable("media is still downloading")),
    )
        .into_response();
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from(state.config.server.retry_after_secs),
    );
    response
}

fn unsatisfiable(total: Option<u64>) -> Response {
    let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    if let Some(total) = total {
        insert_header(
            response.headers_mut(),
            header::CONTENT_RANGE,
            &format!("bytes */{total}"),
        );
    }
    response
}

fn content_type(track: &Track, record: &DownloadRecord) -> String {
    record
        .content_type
        .clone()
        .or_else(|| track.music_content_type.clone())
        .unwrap_or_else(|| guess_audio_content_type(&record.local_path).to_string())
}

fn not_modified_since(headers: &HeaderMap, record: &DownloadRecord) -> bool {
    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    match (record.last_modified, since) {
        (Some(modified), Some(since)) => modified.timestamp() <= since.timestamp(),
        _ => false,
    }
}

fn insert_last_modified(response: &mut Response, record: &DownloadRecord) {
    if let Some(modified) = &record.last_modified {
        insert_header(
            response.headers_mut(),
            header::LAST_MODIFIED,
            &format_http_date(modified),
        );
    }
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
