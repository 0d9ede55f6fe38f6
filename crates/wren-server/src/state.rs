use std::sync::Arc;

use wren::relay::RelayService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub model: String,
}

impl AppState {
    pub fn new(relay: RelayService, model: impl Into<String>) -> Self {
        Self {
            relay: Arc::new(relay),
            model: model.into(),
        }
    }
}
