//! The tmux observation engine: attaches to live multiplexer sessions,
//! mirrors every pane's output and topology into an in-memory registry, and
//! emits debounced change events to subscribers.
//!
//! External collaborators (HTTP/RPC surface, push-channel framing, CORS,
//! auth) are out of scope for this crate; see `observer-gateway` for a
//! minimal demonstration of how they consume [`ObserverContext`].

pub mod config;
pub mod control_mode;
pub mod cursor;
pub mod discovery;
pub mod error;
pub mod input_parser;
pub mod manager;
pub mod model;
pub mod observer;
pub mod registry;
pub mod shim;

pub use config::ObserverConfig;
pub use error::{ObserverError, Result};
pub use manager::SessionManager;
pub use model::{Event, InputRequest, InputType, PaneInfo, PaneState, PaneStatus};
pub use observer::{Observer, ObserverMode};
pub use registry::PaneRegistry;

use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared handle injected into external collaborators (HTTP handlers, the
/// push-channel relay): the registry plus a broadcast sender for the event
/// stream. Built once at process startup, as §9's "Global service
/// singletons... becomes a shared context value" design note directs.
#[derive(Clone)]
pub struct ObserverContext {
    pub registry: Arc<PaneRegistry>,
    pub events: broadcast::Sender<Event>,
}

impl ObserverContext {
    pub fn new(registry: Arc<PaneRegistry>, events: broadcast::Sender<Event>) -> Self {
        Self { registry, events }
    }
}
