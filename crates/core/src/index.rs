//! ChunkIndex trait: the full-text search collaborator for document chunks.
//!
//! The retriever uses an index only to weight its lexical scores. When the
//! index is unavailable the retriever falls back to in-process term counting,
//! so implementations are free to fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkId};
use crate::error::IndexError;

/// A full-text rank for one chunk. Higher is better, never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRank {
    pub chunk_id: ChunkId,
    pub rank: f64,
}

/// The core ChunkIndex trait.
///
/// Implementations: SQLite FTS5, in-memory (for testing), none (always unavailable).
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory", "none").
    fn name(&self) -> &str;

    /// Add or replace chunks in the index.
    async fn index_chunks(&self, chunks: &[Chunk]) -> Result<usize, IndexError>;

    /// Rank chunks of the given documents against a free-text query.
    async fn rank(
        &self,
        query: &str,
        document_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ChunkRank>, IndexError>;

    /// Load every chunk of the given documents, ordered by document then chunk index.
    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<Chunk>, IndexError>;

    /// Total number of indexed chunks.
    async fn count(&self) -> Result<usize, IndexError>;
}
