//! Entity routes. Handlers resolve the entity name from the first path segment against the registry.

use crate::handlers::entity::{create, delete as delete_handler, link, list, read, unlink, update};
use crate::state::AppState;
use axum::{routing::get, routing::put, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:entity", get(list).post(create))
        .route(
            "/:entity/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .route(
            "/:entity/:id/:relation/:target_id",
            put(link).delete(unlink),
        )
        .with_state(state)
}
