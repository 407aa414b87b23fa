use std::sync::Arc;

use crate::services::{queue::JobDispatcher, store::JobStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub dispatcher: Arc<dyn JobDispatcher>,
}

impl AppState {
    pub fn new(store: impl JobStore + 'static, dispatcher: impl JobDispatcher + 'static) -> Self {
        Self {
            store: Arc::new(store),
            dispatcher: Arc::new(dispatcher),
        }
    }
}
