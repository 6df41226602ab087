//! Shared application state for all routes.

use crate::session::Session;

#[derive(Clone)]
pub struct AppState {
    /// Registry, storage and timeout shared by every handler.
    pub session: Session,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        AppState { session }
    }
}
