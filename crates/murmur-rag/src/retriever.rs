//! Query-time retrieval: embed, search, filter, assemble context.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use murmur_core::error::MurmurError;

use crate::embedding::DynEmbeddingService;
use crate::index::{KnowledgeIndex, SearchHit};

/// Separator between chunks in the assembled context block.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// A truncated chunk is only included if at least this many characters of its
/// content survive.
const MIN_TRUNCATED_CHARS: usize = 100;

/// Result of one retrieval pass. A value object, recomputed per query.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub query: String,
    /// Chunks that passed the relevance threshold, highest similarity first.
    pub chunks: Vec<SearchHit>,
    /// Context block ready to inject into a generation prompt.
    pub context_text: String,
    /// Scores of the retained chunks, same order as `chunks`.
    pub relevance_scores: Vec<f64>,
    pub has_relevant_content: bool,
}

impl RetrievalResult {
    /// Highest retained relevance score, or 0.0 when nothing was retained.
    pub fn top_score(&self) -> f64 {
        self.relevance_scores
            .iter()
            .copied()
            .fold(0.0_f64, f64::max)
    }

    /// Mean retained relevance score, or 0.0 when nothing was retained.
    pub fn average_score(&self) -> f64 {
        if self.relevance_scores.is_empty() {
            return 0.0;
        }
        self.relevance_scores.iter().sum::<f64>() / self.relevance_scores.len() as f64
    }

    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            chunks: Vec::new(),
            context_text: String::new(),
            relevance_scores: Vec::new(),
            has_relevant_content: false,
        }
    }
}

/// Turns a query into a ranked, threshold-filtered, size-bounded context
/// block.
pub struct Retriever {
    index: KnowledgeIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    top_k: usize,
    relevance_threshold: f64,
    max_context_chars: usize,
}

impl Retriever {
    pub fn new(
        index: KnowledgeIndex,
        embedder: Arc<dyn DynEmbeddingService>,
        top_k: usize,
        relevance_threshold: f64,
        max_context_chars: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            top_k,
            relevance_threshold,
            max_context_chars,
        }
    }

    /// Retrieve relevant context for a query.
    ///
    /// Embedding or index failures propagate as errors; callers that can
    /// proceed without grounding treat an error as "no context".
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f64>,
    ) -> Result<RetrievalResult, MurmurError> {
        let k = top_k.unwrap_or(self.top_k);
        let threshold = threshold.unwrap_or(self.relevance_threshold);

        let processed = preprocess_query(query);
        if processed.is_empty() {
            return Ok(RetrievalResult::empty(query));
        }

        let query_vector = self.embedder.embed_boxed(&processed).await?;

        let results = self.index.search(&query_vector, k, None)?;
        let total = results.len();

        let relevant: Vec<SearchHit> = results
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .collect();

        if total > relevant.len() {
            debug!(
                filtered = total - relevant.len(),
                threshold, "Dropped results below relevance threshold"
            );
        }

        let context_text = self.format_context(&relevant);
        let relevance_scores: Vec<f64> = relevant.iter().map(|hit| hit.score).collect();

        let result = RetrievalResult {
            query: query.to_string(),
            has_relevant_content: !relevant.is_empty(),
            chunks: relevant,
            context_text,
            relevance_scores,
        };

        info!(
            retained = result.chunks.len(),
            top_score = result.top_score(),
            "Retrieval complete"
        );

        Ok(result)
    }

    /// Assemble retained chunks into a bounded context block.
    ///
    /// Each chunk is rendered as `[Source N: title]` followed by its content.
    /// Chunks are appended in ranked order until the character budget is
    /// reached; the chunk that would overflow is truncated with an ellipsis
    /// marker rather than dropped, provided a meaningful amount remains.
    fn format_context(&self, hits: &[SearchHit]) -> String {
        if hits.is_empty() {
            return String::new();
        }

        let mut parts: Vec<String> = Vec::new();
        let mut total_chars = 0usize;

        for (i, hit) in hits.iter().enumerate() {
            let title = hit
                .metadata
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            let header = format!("[Source {}: {}]", i + 1, title);
            let content = hit.content.trim();

            let block_len = header.len() + 1 + content.len();
            if total_chars + block_len > self.max_context_chars {
                let remaining = self
                    .max_context_chars
                    .saturating_sub(total_chars + header.len() + 10);
                if remaining > MIN_TRUNCATED_CHARS {
                    let truncated = truncate_chars(content, remaining);
                    parts.push(format!("{}\n{}...", header, truncated));
                }
                break;
            }

            parts.push(format!("{}\n{}", header, content));
            total_chars += block_len + 2;
        }

        parts.join(CHUNK_SEPARATOR)
    }
}

/// Basic query normalization before embedding.
fn preprocess_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` bytes without splitting a UTF-8 char.
fn truncate_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
