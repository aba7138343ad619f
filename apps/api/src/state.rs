use std::sync::Arc;

use crate::screening::EditorRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Open editors, one per vacancy.
    pub registry: Arc<EditorRegistry>,
}
