use thiserror::Error;

/// Top-level error type for the Murmur system.
///
/// Each variant covers one failure class from the pipeline. Subsystem crates
/// return `MurmurError` directly so that the `?` operator works across crate
/// boundaries without per-crate conversion layers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MurmurError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream provider cannot be reached at all (missing credentials,
    /// bad endpoint). Sessions fall back to degraded mode instead of failing.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An established provider connection dropped. Retryable with backoff.
    #[error("Provider disconnected: {0}")]
    ProviderDisconnected(String),

    /// A client sent malformed JSON or an unknown message type. The
    /// connection stays open; the client receives an `error` frame.
    #[error("Invalid client message: {0}")]
    InvalidClientMessage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for MurmurError {
    fn from(err: toml::de::Error) -> Self {
        MurmurError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MurmurError {
    fn from(err: toml::ser::Error) -> Self {
        MurmurError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MurmurError {
    fn from(err: serde_json::Error) -> Self {
        MurmurError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;
