//! Murmur application binary - composition root.
//!
//! Builds the dependency graph bottom-up and starts the server:
//! 1. Load configuration from TOML and provider keys from the environment
//! 2. Construct the knowledge layer (chunker, index, embedder, retriever)
//! 3. Select the transcription provider and generation backend
//! 4. Register the session manager and serve the websocket endpoint

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use murmur_agent::{GenerationService, HttpGenerationClient, ScriptedBackend};
use murmur_api::{create_router, AppState};
use murmur_core::config::MurmurConfig;
use murmur_core::Result;
use murmur_rag::{HttpEmbeddingClient, KnowledgeIndex, MockEmbedding, Retriever};
use murmur_rag::embedding::{DynEmbeddingService, EMBEDDING_DIM};
use murmur_session::SessionManager;
use murmur_transcribe::{DegradedProvider, TranscriptionProvider, WsTranscriptionProvider};

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let mut config = MurmurConfig::load_or_default(&config_path);
    config.server.port = args.resolve_port(config.server.port);

    let log_level = args.resolve_log_level(&config.general.log_level);
    init_tracing(&log_level);

    tracing::info!(
        config = %config_path.display(),
        port = config.server.port,
        "Starting murmur backend"
    );

    let manager = Arc::new(SessionManager::new());
    let retriever = build_retriever(&config);
    let provider = build_provider(&config);
    let backend = build_backend(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, Arc::clone(&manager), provider, backend, retriever);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await?;

    Ok(())
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Knowledge layer: in-memory index plus the configured embedding service.
///
/// Without an embedding endpoint the deterministic mock embedder is used, so
/// retrieval stays functional for development and tests.
fn build_retriever(config: &MurmurConfig) -> Option<Arc<Retriever>> {
    let embedder: Arc<dyn DynEmbeddingService> = match std::env::var("MURMUR_EMBED_ENDPOINT") {
        Ok(endpoint) if !endpoint.is_empty() => {
            let api_key = std::env::var("MURMUR_EMBED_API_KEY").unwrap_or_default();
            tracing::info!(%endpoint, "Using HTTP embedding provider");
            Arc::new(HttpEmbeddingClient::new(
                endpoint,
                api_key,
                "text-embed-v1".to_string(),
                EMBEDDING_DIM,
            ))
        }
        _ => {
            tracing::info!("No embedding endpoint configured; using deterministic mock embedder");
            Arc::new(MockEmbedding::new())
        }
    };

    Some(Arc::new(Retriever::new(
        KnowledgeIndex::new(),
        embedder,
        config.retrieval.top_k,
        config.retrieval.relevance_threshold,
        config.retrieval.max_context_chars,
    )))
}

/// Streaming transcription provider, or the explicit degraded strategy when
/// no endpoint is configured.
fn build_provider(config: &MurmurConfig) -> Arc<dyn TranscriptionProvider> {
    if config.transcription.provider_url.is_empty() {
        tracing::warn!("No transcription provider configured; sessions will run degraded");
        return Arc::new(DegradedProvider::new(Duration::from_secs(
            config.transcription.degraded_interval_secs,
        )));
    }

    let api_key = std::env::var("MURMUR_STT_API_KEY").unwrap_or_default();
    Arc::new(WsTranscriptionProvider::new(
        config.transcription.provider_url.clone(),
        api_key,
    ))
}

/// Generation backend, or a silent scripted backend when no endpoint is
/// configured.
fn build_backend(config: &MurmurConfig) -> Arc<dyn GenerationService> {
    if config.agent.provider_url.is_empty() {
        tracing::warn!("No generation provider configured; suggestions disabled");
        return Arc::new(ScriptedBackend::silent());
    }

    let api_key = std::env::var("MURMUR_GENAI_API_KEY").unwrap_or_default();
    Arc::new(HttpGenerationClient::new(
        config.agent.provider_url.clone(),
        api_key,
        config.agent.model.clone(),
        config.agent.max_response_tokens,
        config.agent.temperature,
    ))
}

async fn shutdown_signal(manager: Arc<SessionManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received; closing all sessions");
    manager.close_all();
}
