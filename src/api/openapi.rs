//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the trackcast HTTP API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the trackcast HTTP API
///
/// The document can be accessed via:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "trackcast HTTP API",
        version = "0.1.0",
        description = "Podcast feeds for artist pages, with media served from a local download cache",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    paths(
        // Feeds
        crate::api::routes::get_named_feed,
        crate::api::routes::get_feed_by_url,

        // Media
        crate::api::routes::get_media,

        // Downloads
        crate::api::routes::list_downloads,
        crate::api::routes::get_download,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::TrackId,
        crate::types::DownloadState,
        crate::types::DownloadRecord,
        crate::types::Event,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "feeds", description = "Podcast RSS rendered from upstream artist pages"),
        (name = "media", description = "Track media served from the download cache, with byte ranges"),
        (name = "downloads", description = "Download status of every known track"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
