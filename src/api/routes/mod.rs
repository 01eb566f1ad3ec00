//! Route handlers for the HTTP server
//!
//! Handlers are organized by domain:
//! - [`feed`] — rendered podcast feeds
//! - [`media`] — cached track media
//! - [`system`] — health, download status, events, OpenAPI

use serde::{Deserialize, Serialize};

mod feed;
mod media;
mod system;

pub use feed::*;
pub use media::*;
pub use system::*;

/// Query parameters for GET /feed
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
pub struct FeedQuery {
    /// Upstream artist page to republish
    pub url: String,
}
