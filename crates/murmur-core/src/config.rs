use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MurmurError, Result};

/// Top-level configuration for the Murmur backend.
///
/// Loaded from `murmur.toml` by default. Each section corresponds to one
/// pipeline stage. Provider API keys are never stored here; the binary reads
/// them from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MurmurConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            transcription: TranscriptionConfig::default(),
            agent: AgentConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl MurmurConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MurmurConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MurmurError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Streaming transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Websocket endpoint of the streaming speech-to-text provider. Empty
    /// means no provider is configured; sessions run degraded.
    pub provider_url: String,
    /// PCM sample rate in Hz.
    pub sample_rate: u32,
    /// Number of audio channels.
    pub channels: u16,
    /// Whether to request speaker diarization.
    pub diarization: bool,
    /// Outbound audio buffer threshold in bytes. Audio is forwarded upstream
    /// once the buffer crosses this size.
    pub buffer_threshold: usize,
    /// Maximum reconnection attempts before falling back to degraded mode.
    pub max_reconnect_attempts: u32,
    /// Initial reconnection backoff in seconds; doubles per attempt.
    pub reconnect_initial_secs: u64,
    /// Interval between scripted transcripts in degraded mode, in seconds.
    pub degraded_interval_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider_url: String::new(),
            sample_rate: 16_000,
            channels: 1,
            diarization: true,
            buffer_threshold: 4096,
            max_reconnect_attempts: 5,
            reconnect_initial_secs: 1,
            degraded_interval_secs: 3,
        }
    }
}

/// Suggestion agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// HTTP endpoint of the generative-model provider. Empty means no
    /// provider is configured; a scripted backend is used instead.
    pub provider_url: String,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Maximum tokens requested per generation.
    pub max_response_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Minimum interval between suggestions for one call, in seconds.
    pub cooldown_secs: u64,
    /// Maximum conversation turns kept as history.
    pub history_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider_url: String::new(),
            model: "fast-chat-v1".to_string(),
            max_response_tokens: 500,
            temperature: 0.3,
            cooldown_secs: 5,
            history_turns: 20,
        }
    }
}

/// Knowledge retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest neighbors fetched per query.
    pub top_k: usize,
    /// Minimum similarity for a chunk to count as relevant.
    pub relevance_threshold: f64,
    /// Character budget for the assembled context block.
    pub max_context_chars: usize,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Minimum chunk size in characters.
    pub min_chunk_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            relevance_threshold: 0.7,
            max_context_chars: 8000,
            chunk_size: 2000,
            chunk_overlap: 200,
            min_chunk_size: 400,
        }
    }
}
