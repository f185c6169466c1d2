//! No-op index: every call reports the index as unavailable.
//!
//! Selected with `backend = "none"`; retrieval then always runs in degraded mode.

use async_trait::async_trait;
use parley_core::error::IndexError;
use parley_core::{Chunk, ChunkIndex, ChunkRank};

pub struct NoopIndex;

const REASON: &str = "no index backend configured";

#[async_trait]
impl ChunkIndex for NoopIndex {
    fn name(&self) -> &str {
        "none"
    }

    async fn index_chunks(&self, _chunks: &[Chunk]) -> Result<usize, IndexError> {
        Err(IndexError::Unavailable(REASON.into()))
    }

    async fn rank(&self, _query: &str, _document_ids: &[String], _limit: usize) -> Result<Vec<ChunkRank>, IndexError> {
        Err(IndexError::Unavailable(REASON.into()))
    }

    async fn chunks_for_documents(&self, _document_ids: &[String]) -> Result<Vec<Chunk>, IndexError> {
        Err(IndexError::Unavailable(REASON.into()))
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rank_is_unavailable() {
        let err = NoopIndex.rank("q", &["a".into()], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
        assert_eq!(NoopIndex.count().await.unwrap(), 0);
    }
}
