//! Text ingestion: chunk, embed, and store documents in the knowledge index.
//!
//! Accepts plain text and markdown (title extraction only). Chunk ids are
//! deterministic hashes of source + index + content, so re-ingesting
//! identical content overwrites the same entries instead of duplicating them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use murmur_core::error::MurmurError;

use crate::chunker::TextChunker;
use crate::embedding::DynEmbeddingService;
use crate::index::KnowledgeIndex;

/// A source document before chunking.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub source: String,
    pub title: String,
    pub metadata: Value,
}

impl Document {
    /// Create a plain-text document. An empty title falls back to the source
    /// identifier.
    pub fn text(content: impl Into<String>, source: impl Into<String>, title: &str) -> Self {
        let source = source.into();
        let title = if title.is_empty() {
            source.clone()
        } else {
            title.to_string()
        };
        Self {
            content: content.into(),
            source,
            title,
            metadata: Value::Object(Default::default()),
        }
    }

    /// Create a document from markdown, taking the title from the first H1
    /// heading if present.
    pub fn markdown(content: impl Into<String>, source: impl Into<String>) -> Self {
        let content = content.into();
        let heading = Regex::new(r"(?m)^#\s+(.+)$").unwrap();
        let title = heading
            .captures(&content)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        let mut doc = Self::text(content, source, &title);
        doc.metadata = serde_json::json!({"doc_type": "markdown"});
        doc
    }
}

/// A processed chunk of a document, ready for (or already in) the index.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub title: String,
    pub index: usize,
    pub total: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub metadata: Value,
    pub embedding: Option<Vec<f32>>,
}

/// Chunks, embeds, and upserts documents into the knowledge index.
pub struct IngestionPipeline {
    chunker: TextChunker,
    index: KnowledgeIndex,
    embedder: Arc<dyn DynEmbeddingService>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: TextChunker,
        index: KnowledgeIndex,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Self {
        Self {
            chunker,
            index,
            embedder,
        }
    }

    /// Ingest a document: chunk, embed each chunk, upsert into the index.
    ///
    /// Chunks whose embedding fails are skipped with a warning; the rest of
    /// the document still lands. Returns the stored chunks.
    pub async fn ingest_document(&self, document: &Document) -> Result<Vec<Chunk>, MurmurError> {
        let spans = self.chunker.split(&document.content);
        if spans.is_empty() {
            warn!(source = %document.source, "Document produced no chunks");
            return Ok(Vec::new());
        }

        let total = spans.len();
        let mut stored: Vec<Chunk> = Vec::with_capacity(total);

        for (i, span) in spans.into_iter().enumerate() {
            let id = chunk_id(&document.source, i, &span.text);

            let embedding = match self.embedder.embed_boxed(&span.text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(chunk = %id, error = %e, "Skipping chunk with failed embedding");
                    continue;
                }
            };

            let metadata = merge_metadata(
                &document.metadata,
                serde_json::json!({
                    "title": document.title,
                    "source": document.source,
                    "chunk_index": i,
                    "total_chunks": total,
                }),
            );

            stored.push(Chunk {
                id,
                content: span.text,
                source: document.source.clone(),
                title: document.title.clone(),
                index: i,
                total,
                start_char: span.start,
                end_char: span.end,
                metadata,
                embedding: Some(embedding),
            });
        }

        if stored.is_empty() {
            return Err(MurmurError::Embedding(format!(
                "No valid embeddings generated for document: {}",
                document.source
            )));
        }

        self.index.upsert(
            stored.iter().map(|c| c.id.clone()).collect(),
            stored
                .iter()
                .map(|c| c.embedding.clone().unwrap_or_default())
                .collect(),
            stored.iter().map(|c| c.content.clone()).collect(),
            stored.iter().map(|c| c.metadata.clone()).collect(),
        )?;

        info!(
            source = %document.source,
            title = %document.title,
            chunks = stored.len(),
            "Document ingested"
        );

        Ok(stored)
    }

    /// Ingest raw text directly under a source identifier.
    pub async fn ingest_text(
        &self,
        text: &str,
        source: &str,
        title: &str,
    ) -> Result<Vec<Chunk>, MurmurError> {
        let document = Document::text(text, source, title);
        self.ingest_document(&document).await
    }
}

/// Deterministic chunk id from source, position, and content.
fn chunk_id(source: &str, index: usize, content: &str) -> String {
    format!(
        "{:016x}_{}_{:016x}",
        hash_str(source),
        index,
        hash_str(content)
    )
}

fn hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Overlay `extra` onto `base`, with `extra` winning on key collisions.
fn merge_metadata(base: &Value, extra: Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Default::default(),
    };
    if let Value::Object(extra_map) = extra {
        for (k, v) in extra_map {
            merged.insert(k, v);
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;

    fn build_pipeline() -> IngestionPipeline {
        IngestionPipeline::new(
            TextChunker::new(200, 20, 0),
            KnowledgeIndex::new(),
            Arc::new(MockEmbedding::new()),
        )
    }

    #[tokio::test]
    async fn test_ingest_text_stores_chunks() {
        let pipeline = build_pipeline();
        let text = "Our onboarding takes two weeks. Security reviews run in parallel. ".repeat(10);

        let chunks = pipeline.ingest_text(&text, "onboarding.txt", "Onboarding").await.unwrap();

        assert!(!chunks.is_empty());
        assert_eq!(pipeline.index.count(), chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.total, chunks.len());
            assert_eq!(chunk.title, "Onboarding");
            assert!(chunk.embedding.is_some());
            assert_eq!(chunk.metadata["title"], "Onboarding");
            assert_eq!(chunk.metadata["source"], "onboarding.txt");
        }
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let pipeline = build_pipeline();
        let text = "Identical content produces identical chunk ids every time. ".repeat(8);

        let first = pipeline.ingest_text(&text, "doc.txt", "Doc").await.unwrap();
        let count_after_first = pipeline.index.count();
        let second = pipeline.ingest_text(&text, "doc.txt", "Doc").await.unwrap();

        assert_eq!(
            first.iter().map(|c| &c.id).collect::<Vec<_>>(),
            second.iter().map(|c| &c.id).collect::<Vec<_>>()
        );
        assert_eq!(pipeline.index.count(), count_after_first);
    }

    #[tokio::test]
    async fn test_different_sources_get_different_ids() {
        let pipeline = build_pipeline();
        let text = "Shared content in two documents.";

        let a = pipeline.ingest_text(text, "a.txt", "").await.unwrap();
        let b = pipeline.ingest_text(text, "b.txt", "").await.unwrap();

        assert_ne!(a[0].id, b[0].id);
        assert_eq!(pipeline.index.count(), 2);
    }

    #[tokio::test]
    async fn test_empty_document_yields_nothing() {
        let pipeline = build_pipeline();
        let chunks = pipeline.ingest_text("   ", "empty.txt", "").await.unwrap();
        assert!(chunks.is_empty());
        assert_eq!(pipeline.index.count(), 0);
    }

    #[tokio::test]
    async fn test_markdown_title_extraction() {
        let doc = Document::markdown("# Pricing Guide\n\nDetails follow.", "pricing.md");
        assert_eq!(doc.title, "Pricing Guide");
        assert_eq!(doc.metadata["doc_type"], "markdown");

        let untitled = Document::markdown("No heading here.", "notes.md");
        assert_eq!(untitled.title, "notes.md");
    }

    #[tokio::test]
    async fn test_document_metadata_preserved_in_chunks() {
        let pipeline = build_pipeline();
        let doc = Document::markdown("# Guide\n\nSome body text for the guide.", "guide.md");
        let chunks = pipeline.ingest_document(&doc).await.unwrap();
        assert_eq!(chunks[0].metadata["doc_type"], "markdown");
        assert_eq!(chunks[0].metadata["title"], "Guide");
    }

    #[test]
    fn test_chunk_id_deterministic() {
        let a = chunk_id("src", 0, "content");
        let b = chunk_id("src", 0, "content");
        assert_eq!(a, b);
        assert_ne!(chunk_id("src", 1, "content"), a);
        assert_ne!(chunk_id("src", 0, "other"), a);
        assert_ne!(chunk_id("other", 0, "content"), a);
    }

    #[test]
    fn test_text_document_title_fallback() {
        let doc = Document::text("body", "fallback.txt", "");
        assert_eq!(doc.title, "fallback.txt");
    }

    #[test]
    fn test_merge_metadata_extra_wins() {
        let base = serde_json::json!({"a": 1, "title": "old"});
        let merged = merge_metadata(&base, serde_json::json!({"title": "new", "b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
        assert_eq!(merged["title"], "new");
    }
}
