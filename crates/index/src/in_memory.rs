//! In-memory index: useful for testing and ephemeral sessions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::error::IndexError;
use parley_core::{Chunk, ChunkId, ChunkIndex, ChunkRank};
use tokio::sync::RwLock;

use crate::terms::terms;

/// Chunks held in a map ordered by document then chunk index.
///
/// Ranks by query term occurrences, normalized by chunk length.
pub struct InMemoryChunkIndex {
    chunks: Arc<RwLock<BTreeMap<ChunkId, Chunk>>>,
}

impl InMemoryChunkIndex {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    fn occurrences(query_terms: &[String], text: &str) -> usize {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .filter(|t| {
                let lower = t.to_lowercase();
                query_terms.iter().any(|q| *q == lower)
            })
            .count()
    }
}

impl Default for InMemoryChunkIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkIndex for InMemoryChunkIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn index_chunks(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        let mut map = self.chunks.write().await;
        for chunk in chunks {
            map.insert(chunk.id(), chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn rank(
        &self,
        query: &str,
        document_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ChunkRank>, IndexError> {
        let query_terms = terms(query);
        if query_terms.is_empty() || document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let map = self.chunks.read().await;
        let mut ranks: Vec<ChunkRank> = map
            .values()
            .filter(|c| document_ids.contains(&c.source_document_id))
            .filter_map(|c| {
                let hits = Self::occurrences(&query_terms, &c.text);
                if hits == 0 {
                    return None;
                }
                let length_norm = (c.token_count() as f64 / 100.0).max(1.0);
                Some(ChunkRank {
                    chunk_id: c.id(),
                    rank: hits as f64 / length_norm,
                })
            })
            .collect();

        ranks.sort_by(|a, b| b.rank.total_cmp(&a.rank).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        ranks.truncate(limit);
        Ok(ranks)
    }

    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<Chunk>, IndexError> {
        let map = self.chunks.read().await;
        Ok(map
            .values()
            .filter(|c| document_ids.contains(&c.source_document_id))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.chunks.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryChunkIndex {
        let index = InMemoryChunkIndex::new();
        index
            .index_chunks(&[
                Chunk::new("a", 0, "Rust ownership and borrowing."),
                Chunk::new("a", 1, "Rust rust rust."),
                Chunk::new("b", 0, "Rust in another document."),
                Chunk::new("a", 2, "Nothing to see."),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn ranks_by_occurrences_within_documents() {
        let index = seeded().await;
        let ranks = index.rank("rust", &["a".into()], 10).await.unwrap();
        assert_eq!(ranks.len(), 2);
        assert_eq!(ranks[0].chunk_id, ChunkId::new("a", 1));
        assert_eq!(ranks[0].rank, 3.0);
        assert_eq!(ranks[1].chunk_id, ChunkId::new("a", 0));
    }

    #[tokio::test]
    async fn rank_respects_limit_and_empty_inputs() {
        let index = seeded().await;
        assert_eq!(index.rank("rust", &["a".into(), "b".into()], 1).await.unwrap().len(), 1);
        assert!(index.rank("", &["a".into()], 10).await.unwrap().is_empty());
        assert!(index.rank("rust", &[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reindexing_replaces_chunk() {
        let index = seeded().await;
        index.index_chunks(&[Chunk::new("a", 1, "replaced text")]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 4);
        let chunks = index.chunks_for_documents(&["a".into()]).await.unwrap();
        assert_eq!(chunks[1].text, "replaced text");
    }

    #[tokio::test]
    async fn chunks_ordered_by_document_then_index() {
        let index = seeded().await;
        let chunks = index
            .chunks_for_documents(&["b".into(), "a".into()])
            .await
            .unwrap();
        let ids: Vec<String> = chunks.iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["a#0", "a#1", "a#2", "b#0"]);
    }
}
