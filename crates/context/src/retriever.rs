//! Lexical chunk retrieval.
//!
//! A chunk's score is `term_count * (1 + max(rank, 0))`, where `term_count`
//! is the number of distinct query terms present in the chunk text and `rank`
//! is the full-text index rank, or 0 when no index is consulted. Only chunks
//! with a positive score are returned, best first, capped at `top_k`.

use std::collections::{BTreeSet, HashMap, HashSet};

use parley_core::{Chunk, ChunkId, ChunkIndex, ChunkRank, ConversationBudget};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A chunk paired with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub relevance_score: f64,
    /// Distinct query terms found in the chunk.
    pub matched_terms: usize,
}

/// Ranked retrieval output, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    /// True when the full-text index failed and plain term counting was used.
    pub degraded: bool,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|s| s.chunk.id()).collect()
    }
}

/// Lowercased terms of `text`, split on any non-alphanumeric character.
pub fn query_terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of distinct `terms` that occur as whole terms in `text`.
pub fn term_count(terms: &BTreeSet<String>, text: &str) -> usize {
    let present = query_terms(text);
    terms.iter().filter(|t| present.contains(*t)).count()
}

/// Ranks candidate chunks against a query.
#[derive(Debug, Clone)]
pub struct ChunkRetriever {
    top_k: usize,
}

impl ChunkRetriever {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn from_budget(budget: &ConversationBudget) -> Self {
        Self::new(budget.retrieval_top_k)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score and order `candidates` without touching any index.
    ///
    /// `ranks` weights the lexical score when present. Duplicate chunk ids
    /// keep their first occurrence. Ties break on chunk index, then document id.
    pub fn rank(&self, query: &str, candidates: &[Chunk], ranks: Option<&[ChunkRank]>) -> RetrievalResult {
        let terms = query_terms(query);
        if terms.is_empty() || self.top_k == 0 {
            return RetrievalResult::empty();
        }

        let rank_by_id: HashMap<&ChunkId, f64> = ranks
            .unwrap_or_default()
            .iter()
            .map(|r| (&r.chunk_id, r.rank))
            .collect();

        let mut seen = HashSet::new();
        let mut scored: Vec<ScoredChunk> = Vec::new();
        for chunk in candidates {
            let id = chunk.id();
            if !seen.insert(id.clone()) {
                continue;
            }
            let matched = term_count(&terms, &chunk.text);
            if matched == 0 {
                continue;
            }
            let rank = rank_by_id
                .get(&id)
                .copied()
                .filter(|r| r.is_finite())
                .unwrap_or(0.0)
                .max(0.0);
            scored.push(ScoredChunk {
                chunk: chunk.clone(),
                relevance_score: matched as f64 * (1.0 + rank),
                matched_terms: matched,
            });
        }

        scored.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
                .then_with(|| a.chunk.source_document_id.cmp(&b.chunk.source_document_id))
        });
        scored.truncate(self.top_k);

        RetrievalResult {
            chunks: scored,
            degraded: false,
        }
    }

    /// Score candidates, weighting by the full-text index when one is available.
    ///
    /// An index failure never fails retrieval: it is logged and the result is
    /// marked degraded.
    pub async fn retrieve(
        &self,
        index: Option<&dyn ChunkIndex>,
        query: &str,
        candidates: &[Chunk],
    ) -> RetrievalResult {
        if candidates.is_empty() {
            return RetrievalResult::empty();
        }
        let Some(index) = index else {
            return self.rank(query, candidates, None);
        };

        let document_ids: Vec<String> = candidates
            .iter()
            .map(|c| c.source_document_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        match index.rank(query, &document_ids, candidates.len()).await {
            Ok(ranks) => {
                debug!(backend = index.name(), ranked = ranks.len(), "Full-text ranks loaded");
                self.rank(query, candidates, Some(&ranks))
            }
            Err(e) => {
                warn!(
                    backend = index.name(),
                    error = %e,
                    "Full-text index unavailable, falling back to term counting"
                );
                let mut result = self.rank(query, candidates, None);
                result.degraded = true;
                result
            }
        }
    }
}
