//! Voice Serving Gateway
//!
//! A Rust gateway fronting the two upstream dependencies of a voice ordering
//! assistant: OpenAI compatible chat completion backends and streaming speech
//! recognition backends. Both are tried in a configured order with
//! per-backend timeouts, so a failing primary degrades into its standby
//! instead of an outage.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod router;
pub mod speech;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::registry::BackendRegistry;
use router::CompletionRouter;
use speech::{SpeechConnector, WebSocketConnector};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub registry: Arc<BackendRegistry>,
    pub completion_router: Arc<CompletionRouter>,
    pub connector: Arc<dyn SpeechConnector>,
}

impl AppState {
    /// Build the full state from validated settings: registry, completion
    /// router, and the WebSocket connector for speech sessions.
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        let registry = Arc::new(BackendRegistry::from_settings(&settings));
        let completion_router = Arc::new(CompletionRouter::from_registry(&registry)?);
        Ok(Self {
            settings: Arc::new(settings),
            registry,
            completion_router,
            connector: Arc::new(WebSocketConnector::default()),
        })
    }
}
