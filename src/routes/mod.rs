//! Router assembly.

pub mod common;
pub mod entity;

pub use common::common_routes;
pub use entity::entity_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies larger than this are rejected with 413.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Common routes at the root, entity routes under `/api/v1`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes())
        .nest("/api/v1", entity_routes(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}
