//! Application state shared across route handlers.
//!
//! Collaborators are constructed once at process start (no module-level
//! singletons) and injected here. Each websocket session builds its own
//! stream and agent from these shared services.

use std::sync::Arc;

use murmur_agent::GenerationService;
use murmur_core::config::MurmurConfig;
use murmur_rag::Retriever;
use murmur_session::SessionManager;
use murmur_transcribe::TranscriptionProvider;

/// Shared application state. All fields are `Arc`'d for cheap cloning into
/// handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<MurmurConfig>,
    /// The cross-call session table.
    pub manager: Arc<SessionManager>,
    /// Streaming transcription provider used by new sessions.
    pub provider: Arc<dyn TranscriptionProvider>,
    /// Generative-model backend used by new sessions.
    pub backend: Arc<dyn GenerationService>,
    /// Knowledge retriever for grounded suggestions, if configured.
    pub retriever: Option<Arc<Retriever>>,
}

impl AppState {
    pub fn new(
        config: MurmurConfig,
        manager: Arc<SessionManager>,
        provider: Arc<dyn TranscriptionProvider>,
        backend: Arc<dyn GenerationService>,
        retriever: Option<Arc<Retriever>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            manager,
            provider,
            backend,
            retriever,
        }
    }
}
