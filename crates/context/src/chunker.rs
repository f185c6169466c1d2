//! Split document text into indexable chunks.
//!
//! Paragraphs (separated by a blank line) are packed greedily up to the target
//! size. A paragraph larger than the target is split on sentence boundaries
//! first. A single sentence larger than the target becomes its own chunk.

use parley_core::Chunk;

use crate::token::estimate_tokens;

/// Default chunk size in estimated tokens.
pub const DEFAULT_CHUNK_TARGET_TOKENS: usize = 500;

struct ChunkBuilder<'a> {
    document_id: &'a str,
    target: usize,
    pieces: Vec<&'a str>,
    tokens: usize,
    chunks: Vec<Chunk>,
}

impl<'a> ChunkBuilder<'a> {
    fn push(&mut self, piece: &'a str) {
        let tokens = estimate_tokens(piece);
        if !self.pieces.is_empty() && self.tokens + tokens > self.target {
            self.flush();
        }
        self.pieces.push(piece);
        self.tokens += tokens;
    }

    fn flush(&mut self) {
        if self.pieces.is_empty() {
            return;
        }
        let index = self.chunks.len();
        self.chunks
            .push(Chunk::new(self.document_id, index, self.pieces.join(" ")));
        self.pieces.clear();
        self.tokens = 0;
    }
}

/// Chunk `text` for `document_id`, numbering chunks from 0.
pub fn chunk_document(document_id: &str, text: &str, target_tokens: usize) -> Vec<Chunk> {
    let target = target_tokens.max(1);
    let mut builder = ChunkBuilder {
        document_id,
        target,
        pieces: Vec::new(),
        tokens: 0,
        chunks: Vec::new(),
    };

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if estimate_tokens(paragraph) > target {
            for sentence in paragraph
                .split_inclusive(". ")
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                builder.push(sentence);
            }
        } else {
            builder.push(paragraph);
        }
    }
    builder.flush();
    builder.chunks
}
