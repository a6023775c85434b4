//! Knowledge retrieval for grounded suggestions.
//!
//! Pipeline: documents are split into overlapping chunks (`chunker`), embedded
//! (`embedding`), and stored in the vector index (`index`). At query time the
//! retriever (`retriever`) embeds the query, searches the index, filters by
//! relevance, and assembles a bounded context block.

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod retriever;

pub use chunker::{ChunkSpan, TextChunker};
pub use embedding::{DynEmbeddingService, EmbeddingService, HttpEmbeddingClient, MockEmbedding};
pub use index::{KnowledgeIndex, SearchHit};
pub use ingest::{Chunk, Document, IngestionPipeline};
pub use retriever::{RetrievalResult, Retriever};
