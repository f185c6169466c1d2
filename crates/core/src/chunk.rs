//! Document chunks, the unit of retrieval.

use serde::{Deserialize, Serialize};

use crate::token::estimate_tokens;

/// Stable identity of a chunk: its document plus its position within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub chunk_index: usize,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_index,
        }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document_id, self.chunk_index)
    }
}

/// A fragment of an uploaded document.
///
/// Like [`crate::Turn`], the token count is recomputed on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChunkRecord")]
pub struct Chunk {
    /// Document this fragment was cut from.
    pub source_document_id: String,
    /// The text content of this chunk.
    pub text: String,
    /// Estimated token count of `text`.
    token_count: usize,
    /// Sequential chunk index within the document.
    pub chunk_index: usize,
}

impl Chunk {
    /// Create a chunk, computing its token count from the text.
    pub fn new(source_document_id: impl Into<String>, chunk_index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            source_document_id: source_document_id.into(),
            token_count: estimate_tokens(&text),
            text,
            chunk_index,
        }
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn id(&self) -> ChunkId {
        ChunkId::new(self.source_document_id.clone(), self.chunk_index)
    }
}

#[derive(Deserialize)]
struct ChunkRecord {
    source_document_id: String,
    chunk_index: usize,
    text: String,
}

impl From<ChunkRecord> for Chunk {
    fn from(record: ChunkRecord) -> Self {
        Chunk::new(record.source_document_id, record.chunk_index, record.text)
    }
}
