//! In-memory knowledge index with brute-force cosine similarity search.
//!
//! Implements the same contract an external vector-search provider would:
//! upsert, top-k search with optional metadata filtering, delete, count,
//! clear. All search operations are O(n), which is acceptable for
//! knowledge-base scale corpora.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use murmur_core::error::MurmurError;

/// A single hit returned from an index search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Id of the matching chunk.
    pub id: String,
    /// Chunk content.
    pub content: String,
    /// Similarity in [0, 1] where 1 is identical.
    pub score: f64,
    /// Metadata stored with the chunk.
    pub metadata: Value,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    embedding: Vec<f32>,
    content: String,
    metadata: Value,
}

/// Thread-safe in-memory vector index keyed by chunk id.
///
/// Upserting an existing id replaces its entry, which makes re-ingestion of
/// identical content idempotent (chunk ids are content-derived).
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    entries: Arc<RwLock<HashMap<String, IndexEntry>>>,
}

impl KnowledgeIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace a batch of chunks.
    ///
    /// All slices must have the same length.
    pub fn upsert(
        &self,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        contents: Vec<String>,
        metadatas: Vec<Value>,
    ) -> Result<(), MurmurError> {
        if ids.len() != vectors.len() || ids.len() != contents.len() || ids.len() != metadatas.len()
        {
            return Err(MurmurError::Index(
                "ids, vectors, contents, and metadatas must have the same length".into(),
            ));
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|e| MurmurError::Index(format!("Lock poisoned: {}", e)))?;

        for (((id, embedding), content), metadata) in ids
            .into_iter()
            .zip(vectors)
            .zip(contents)
            .zip(metadatas)
        {
            entries.insert(
                id,
                IndexEntry {
                    embedding,
                    content,
                    metadata,
                },
            );
        }
        Ok(())
    }

    /// Search for the k nearest neighbors to the query vector.
    ///
    /// Results are sorted by strictly descending similarity. The similarity
    /// is the index's native cosine distance (1 - cos) renormalized so that
    /// 1.0 means identical, clamped to [0, 1].
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>, MurmurError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| MurmurError::Index(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<SearchHit> = entries
            .iter()
            .filter(|(_, entry)| matches_filter(&entry.metadata, filter))
            .map(|(id, entry)| {
                let cos = cosine_similarity(query, &entry.embedding);
                SearchHit {
                    id: id.clone(),
                    content: entry.content.clone(),
                    score: cos.clamp(0.0, 1.0),
                    metadata: entry.metadata.clone(),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored)
    }

    /// Delete a batch of chunks by id. Missing ids are ignored.
    pub fn delete(&self, ids: &[String]) -> Result<(), MurmurError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| MurmurError::Index(format!("Lock poisoned: {}", e)))?;
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }

    /// Number of chunks currently stored.
    pub fn count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Remove all chunks.
    pub fn clear(&self) -> Result<(), MurmurError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| MurmurError::Index(format!("Lock poisoned: {}", e)))?;
        entries.clear();
        Ok(())
    }

    /// True if the index contains no chunks.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl Default for KnowledgeIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Every key in `filter` must be present and equal in `metadata`.
fn matches_filter(metadata: &Value, filter: Option<&Value>) -> bool {
    let Some(Value::Object(conditions)) = filter else {
        return true;
    };
    let Value::Object(fields) = metadata else {
        return conditions.is_empty();
    };
    conditions
        .iter()
        .all(|(key, expected)| fields.get(key) == Some(expected))
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 on length mismatch or zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert_one(index: &KnowledgeIndex, id: &str, vector: Vec<f32>, metadata: Value) {
        index
            .upsert(
                vec![id.to_string()],
                vec![vector],
                vec![format!("content of {}", id)],
                vec![metadata],
            )
            .unwrap();
    }

    #[test]
    fn test_upsert_and_search() {
        let index = KnowledgeIndex::new();
        upsert_one(&index, "a", vec![1.0; 384], serde_json::json!({"title": "A"}));
        upsert_one(&index, "b", vec![1.0; 384], serde_json::json!({"title": "B"}));

        assert_eq!(index.count(), 2);

        let hits = index.search(&vec![1.0; 384], 5, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_upsert_length_mismatch() {
        let index = KnowledgeIndex::new();
        let result = index.upsert(
            vec!["a".to_string()],
            vec![],
            vec!["c".to_string()],
            vec![serde_json::json!({})],
        );
        assert!(matches!(result, Err(MurmurError::Index(_))));
    }

    #[test]
    fn test_upsert_replaces_existing_id() {
        let index = KnowledgeIndex::new();
        upsert_one(&index, "a", vec![1.0; 4], serde_json::json!({"v": 1}));
        upsert_one(&index, "a", vec![0.5; 4], serde_json::json!({"v": 2}));
        assert_eq!(index.count(), 1);

        let hits = index.search(&[0.5; 4], 1, None).unwrap();
        assert_eq!(hits[0].metadata["v"], 2);
    }

    #[test]
    fn test_search_empty_index() {
        let index = KnowledgeIndex::new();
        let hits = index.search(&[1.0; 4], 10, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_respects_top_k() {
        let index = KnowledgeIndex::new();
        for i in 0..10 {
            upsert_one(&index, &format!("c{}", i), vec![1.0; 8], serde_json::json!({}));
        }
        let hits = index.search(&[1.0; 8], 3, None).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_search_ordering_descending() {
        let index = KnowledgeIndex::new();
        upsert_one(&index, "close", vec![1.0; 8], serde_json::json!({}));
        upsert_one(&index, "far", vec![-1.0; 8], serde_json::json!({}));

        let hits = index.search(&[1.0; 8], 10, None).unwrap();
        assert_eq!(hits[0].id, "close");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_scores_clamped_to_unit_range() {
        let index = KnowledgeIndex::new();
        upsert_one(&index, "opposite", vec![-1.0; 8], serde_json::json!({}));
        let hits = index.search(&[1.0; 8], 1, None).unwrap();
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn test_metadata_filter() {
        let index = KnowledgeIndex::new();
        upsert_one(
            &index,
            "a",
            vec![1.0; 8],
            serde_json::json!({"source": "pricing.md"}),
        );
        upsert_one(
            &index,
            "b",
            vec![1.0; 8],
            serde_json::json!({"source": "security.md"}),
        );

        let filter = serde_json::json!({"source": "pricing.md"});
        let hits = index.search(&[1.0; 8], 10, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_filter_on_missing_key_excludes() {
        let index = KnowledgeIndex::new();
        upsert_one(&index, "a", vec![1.0; 8], serde_json::json!({}));
        let filter = serde_json::json!({"source": "pricing.md"});
        let hits = index.search(&[1.0; 8], 10, Some(&filter)).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_delete() {
        let index = KnowledgeIndex::new();
        upsert_one(&index, "a", vec![1.0; 8], serde_json::json!({}));
        upsert_one(&index, "b", vec![1.0; 8], serde_json::json!({}));

        index.delete(&["a".to_string()]).unwrap();
        assert_eq!(index.count(), 1);

        // Deleting a nonexistent id is a no-op.
        index.delete(&["zzz".to_string()]).unwrap();
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn test_clear_and_is_empty() {
        let index = KnowledgeIndex::new();
        assert!(index.is_empty());
        upsert_one(&index, "a", vec![1.0; 8], serde_json::json!({}));
        assert!(!index.is_empty());
        index.clear().unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 100];
        let mut b = vec![0.0f32; 100];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0; 8], &[1.0; 8]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0; 4], &[1.0; 8]), 0.0);
    }

    #[test]
    fn test_clone_shares_entries() {
        let index = KnowledgeIndex::new();
        let cloned = index.clone();
        upsert_one(&index, "a", vec![1.0; 8], serde_json::json!({}));
        assert_eq!(cloned.count(), 1);
    }
}
