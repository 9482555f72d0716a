use std::sync::Arc;

use thedal_core::engine::RetrievalEngine;

/// Shared handle passed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
}

impl AppState {
    pub fn new(engine: RetrievalEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
