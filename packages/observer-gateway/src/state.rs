//! Shared application state injected into every route: the registry handle
//! and the broadcast sender the observer daemon publishes events to.

use std::sync::Arc;

use observer_core::ObserverContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ObserverContext>,
}

impl AppState {
    pub fn new(ctx: Arc<ObserverContext>) -> Self {
        Self { ctx }
    }
}
