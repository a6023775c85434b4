//! Embedding service trait and implementations.
//!
//! - `HttpEmbeddingClient` calls an external embedding provider over HTTP.
//!   This is the production backend.
//! - `MockEmbedding` produces deterministic vectors for testing and for
//!   running without provider credentials.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Deserialize;
use tracing::debug;

use murmur_core::error::MurmurError;

/// Dimensionality of embedding vectors produced by the built-in services.
pub const EMBEDDING_DIM: usize = 384;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors used for both
/// ingestion (indexing) and search (query).
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, MurmurError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future`, so it is not object-safe.
/// This trait boxes the future instead, allowing `Arc<dyn DynEmbeddingService>`
/// to be stored without generics. A blanket implementation covers every
/// `EmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, MurmurError>> + Send + 'a>,
    >;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<f32>, MurmurError>> + Send + 'a>,
    > {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// HttpEmbeddingClient - external provider over HTTP
// ---------------------------------------------------------------------------

/// HTTP-backed embedding client.
///
/// Sends `{"model": ..., "input": ...}` to the configured endpoint and expects
/// `{"embedding": [f32, ...]}` back. The endpoint and key identify the
/// provider; the wire shape is the common denominator of hosted embedding
/// APIs.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: String, api_key: String, model: String, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            dimensions,
        }
    }
}

impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MurmurError> {
        if text.is_empty() {
            return Err(MurmurError::Embedding("Cannot embed empty text".into()));
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MurmurError::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MurmurError::Embedding(format!(
                "Provider returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MurmurError::Embedding(format!("Invalid response body: {}", e)))?;

        if parsed.embedding.len() != self.dimensions {
            return Err(MurmurError::Embedding(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                parsed.embedding.len()
            )));
        }

        debug!(chars = text.len(), "Embedded text via provider");
        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic 384-dimensional unit
/// vectors.
///
/// The vector is expanded from a single hash of the input text, so identical
/// inputs always produce identical outputs and different inputs diverge. This
/// allows search and idempotent-ingestion tests without a real provider.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn expand_to_vector(text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish() | 1;

        let mut result = Vec::with_capacity(EMBEDDING_DIM);
        for _ in 0..EMBEDDING_DIM {
            // xorshift64 expansion of the seed hash.
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let val = ((state as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        // L2-normalize so cosine scores behave like the HTTP backend's
        // normalized embeddings.
        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MurmurError> {
        if text.is_empty() {
            return Err(MurmurError::Embedding("Cannot embed empty text".into()));
        }
        Ok(Self::expand_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_different_inputs() {
        let service = MockEmbedding::new();
        let v1 = service.embed("text one").await.unwrap();
        let v2 = service.embed("text two").await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_embedding_unit_norm() {
        let service = MockEmbedding::new();
        let vec = service.embed("normalize me").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_dyn_embedding_blanket_impl() {
        let service: std::sync::Arc<dyn DynEmbeddingService> =
            std::sync::Arc::new(MockEmbedding::new());
        let vec = service.embed_boxed("via trait object").await.unwrap();
        assert_eq!(vec.len(), service.dimensions());
    }

    #[tokio::test]
    async fn test_http_client_rejects_empty_text() {
        let client = HttpEmbeddingClient::new(
            "http://localhost:0/embed".to_string(),
            "key".to_string(),
            "embed-v1".to_string(),
            EMBEDDING_DIM,
        );
        let result = client.embed("").await;
        assert!(matches!(result, Err(MurmurError::Embedding(_))));
    }
}
