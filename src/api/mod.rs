//! HTTP server module
//!
//! Serves rendered podcast feeds, the cached media their enclosures point at,
//! and a small JSON API for download status and events.

use crate::Result;
use crate::locator::MEDIA_PREFIX;
use axum::{Router, http::HeaderValue, routing::get};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod range;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the router with all route definitions
///
/// # Routes
///
/// ## Feeds
/// - `GET /feeds/:name` - RSS for a configured feed
/// - `GET /feed?url=` - RSS for an arbitrary upstream page
///
/// ## Media
/// - `GET|HEAD /media/:feed_key/:track_id/:file_name` - Cached track media
///
/// ## API
/// - `GET /api/v1/health` - Health check
/// - `GET /api/v1/downloads` - List download records
/// - `GET /api/v1/downloads/:track_id` - One download record
/// - `GET /api/v1/events` - Server-sent events stream
/// - `GET /api/v1/openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/downloads", get(routes::list_downloads))
        .route("/downloads/:track_id", get(routes::get_download))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec));

    // `get` also answers HEAD, without the body
    let router = Router::new()
        .route("/feeds/:name", get(routes::get_named_feed))
        .route("/feed", get(routes::get_feed_by_url))
        .route(
            &format!("/{MEDIA_PREFIX}/:feed_key/:track_id/:file_name"),
            get(routes::get_media),
        )
        .nest("/api/v1", api);

    // SwaggerUi reuses the /api/v1/openapi.json document
    let router = if config.server.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.server.cors_enabled {
        router.layer(build_cors_layer(&config.server.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// "*" (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn start_server(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind_address = state.config.server.bind_address;

    tracing::info!(address = %bind_address, "Starting HTTP server");

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves
///
/// In-flight requests are allowed to finish; the download manager is left
/// running for the caller to shut down.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let address = listener.local_addr().map_err(crate::error::Error::Io)?;
    let app = create_router(state);

    tracing::info!(
        address = %address,
        "HTTP server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
