//! Prompt assembly: the last stage before inference.
//!
//! Produces the ordered turn list sent to the model:
//!
//! 1. **System** (grounding preamble + retrieved chunks), grounded mode only,
//!    and only when retrieval returned something
//! 2. **History** (the windowed suffix, oldest first)
//! 3. **User** (the new turn), always last
//!
//! When the total exceeds `max_context_tokens` the assembler trims in a fixed
//! order: lowest-ranked chunk first (re-rendering the system turn each time),
//! then the oldest history turn, and only then the user turn itself, which is
//! rejected or cut depending on [`UserTurnOverflow`].
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs. No clock, no randomness: the
//! same input always yields an equal [`AssembledPrompt`].

use parley_core::{ChatMode, ChunkId, ConversationBudget, Role, Turn, UserTurnOverflow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::retriever::{RetrievalResult, ScoredChunk};
use crate::token::{estimate_tokens, max_chars_for, truncate_chars};
use crate::window::{HistoryDrop, check_sequence};

/// Opening of the system turn in grounded mode.
pub const GROUNDING_PREAMBLE: &str = "Use the following context from uploaded documents to answer the user's questions.\n\
If the user refers to \"the file\" or \"this document\", they mean the content below.\n\
Answer from the provided context. If it does not contain enough information, say so.\n\n\
Context from documents:";

/// User-facing message for an unrecoverable overflow.
pub const OVERFLOW_MESSAGE: &str =
    "Context too long even after truncation. Please start a new conversation.";

// ── Types ─────────────────────────────────────────────────────────────────

/// One entry of the assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub text: String,
    pub token_count: usize,
    /// Absent for the synthesized grounding turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

impl From<&Turn> for PromptTurn {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            text: turn.text.clone(),
            token_count: turn.token_count(),
            sequence_number: Some(turn.sequence_number),
        }
    }
}

/// All inputs for a single assembly.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub mode: ChatMode,
    /// Ranked chunks, best first.
    pub retrieval: &'a RetrievalResult,
    /// Windowed history, oldest first.
    pub history: &'a [Turn],
    /// What the windower already cut, if anything.
    pub history_drop: Option<&'a HistoryDrop>,
    pub user_turn: &'a Turn,
}

/// The assembled prompt, ready for an inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub turns: Vec<PromptTurn>,
    pub total_tokens: usize,
    /// Chunks that made it into the system turn, in prompt order.
    pub included_chunk_ids: Vec<ChunkId>,
    /// True when the user text was cut to fit.
    pub user_turn_truncated: bool,
    /// Combined windower and assembler history drop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_drop: Option<HistoryDrop>,
    pub metadata: AssemblyMetadata,
}

impl AssembledPrompt {
    pub fn system_turn(&self) -> Option<&PromptTurn> {
        self.turns.first().filter(|t| t.role == Role::System && t.sequence_number.is_none())
    }

    pub fn user_turn(&self) -> Option<&PromptTurn> {
        self.turns.last()
    }
}

/// Token accounting for one assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Configured hard cap.
    pub budget: usize,
    /// Share of the budget used (0.0–100.0).
    pub utilization_pct: f32,
    pub per_section: Vec<SectionStats>,
    pub drops: Vec<DropInfo>,
    /// Desired history size, echoed back. Never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window_target: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items removed from a section while enforcing the budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    pub section: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// The user turn alone exceeds the budget and the policy rejects it.
    #[error("Context too long even after truncation. Please start a new conversation.")]
    ContextOverflow { user_tokens: usize, budget: usize },

    #[error("History sequence numbers must strictly increase: {next} follows {previous}")]
    NonMonotonicHistory { previous: u64, next: u64 },
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Stateless; create one per budget and reuse it.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    budget: ConversationBudget,
    overflow: UserTurnOverflow,
}

impl PromptAssembler {
    pub fn new(budget: ConversationBudget) -> Self {
        Self {
            budget,
            overflow: UserTurnOverflow::default(),
        }
    }

    pub fn with_overflow_policy(mut self, overflow: UserTurnOverflow) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn budget(&self) -> &ConversationBudget {
        &self.budget
    }

    /// Render the grounding system turn for `chunks`, or `None` when there are none.
    pub fn render_grounding<'a>(chunks: impl IntoIterator<Item = &'a ScoredChunk>) -> Option<String> {
        let blocks: Vec<String> = chunks
            .into_iter()
            .map(|s| format!("[Source: {}]\n{}", s.chunk.id(), s.chunk.text))
            .collect();
        if blocks.is_empty() {
            return None;
        }
        Some(format!("{GROUNDING_PREAMBLE}\n\n{}", blocks.join("\n\n")))
    }

    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledPrompt, AssemblyError> {
        check_sequence(input.history, input.user_turn)
            .map_err(|(previous, next)| AssemblyError::NonMonotonicHistory { previous, next })?;

        let max = self.budget.max_context_tokens;
        let mut drops: Vec<DropInfo> = Vec::new();

        if let Some(d) = input.history_drop {
            drops.push(DropInfo {
                section: "history".into(),
                items_dropped: d.dropped_count,
                tokens_dropped: d.dropped_tokens,
                reason: "Oldest turns outside the history window".into(),
            });
        }

        // ── System (grounding) ─────────────────────────────────────────────
        let mut chunks: Vec<&ScoredChunk> = if input.mode.is_grounded() {
            input.retrieval.chunks.iter().collect()
        } else {
            if !input.retrieval.is_empty() {
                debug!(chunks = input.retrieval.len(), "Retrieved chunks ignored in open mode");
            }
            Vec::new()
        };
        if input.mode.is_grounded() && chunks.is_empty() {
            warn!("Grounded chat with no relevant chunks, sending history and user turn only");
        }
        let chunks_total = chunks.len();
        let mut system_text = Self::render_grounding(chunks.iter().copied());
        let mut system_tokens = system_text.as_deref().map_or(0, estimate_tokens);

        // ── History ────────────────────────────────────────────────────────
        let mut history_start = 0usize;
        let mut history_tokens: usize = input.history.iter().map(|t| t.token_count()).sum();
        let mut history_drop = input.history_drop.cloned();

        // ── User ───────────────────────────────────────────────────────────
        let mut user_text = input.user_turn.text.clone();
        let original_user_tokens = input.user_turn.token_count();
        let mut user_tokens = original_user_tokens;

        // (a) lowest-ranked chunks go first
        let mut dropped_chunks = 0usize;
        let mut dropped_chunk_tokens = 0usize;
        while system_tokens + history_tokens + user_tokens > max {
            let Some(removed) = chunks.pop() else { break };
            dropped_chunks += 1;
            dropped_chunk_tokens += removed.chunk.token_count();
            system_text = Self::render_grounding(chunks.iter().copied());
            system_tokens = system_text.as_deref().map_or(0, estimate_tokens);
        }
        if let Some(d) = Self::maybe_drop(
            "grounding",
            dropped_chunks,
            dropped_chunk_tokens,
            "Lowest-ranked chunks dropped to fit budget",
        ) {
            drops.push(d);
        }

        // (b) then the oldest surviving history turn
        let mut dropped_turns = 0usize;
        let mut dropped_turn_tokens = 0usize;
        while system_tokens + history_tokens + user_tokens > max && history_start < input.history.len() {
            let turn = &input.history[history_start];
            history_start += 1;
            history_tokens -= turn.token_count();
            dropped_turns += 1;
            dropped_turn_tokens += turn.token_count();
            match history_drop.as_mut() {
                Some(d) => d.extend(turn),
                None => history_drop = Some(HistoryDrop::from_turn(turn)),
            }
        }
        if let Some(d) = Self::maybe_drop(
            "history",
            dropped_turns,
            dropped_turn_tokens,
            "Oldest turns dropped to fit budget",
        ) {
            drops.push(d);
        }

        // (c) only the user turn is left
        let mut user_turn_truncated = false;
        if system_tokens + history_tokens + user_tokens > max {
            match self.overflow {
                UserTurnOverflow::Reject => {
                    warn!(user_tokens, budget = max, "User turn alone exceeds the context budget");
                    return Err(AssemblyError::ContextOverflow {
                        user_tokens,
                        budget: max,
                    });
                }
                UserTurnOverflow::Truncate => {
                    user_text = truncate_chars(&user_text, max_chars_for(max));
                    user_tokens = estimate_tokens(&user_text);
                    user_turn_truncated = true;
                    warn!(
                        original_tokens = original_user_tokens,
                        user_tokens,
                        budget = max,
                        "User turn truncated to fit the context budget"
                    );
                    drops.push(DropInfo {
                        section: "user".into(),
                        items_dropped: 0,
                        tokens_dropped: original_user_tokens - user_tokens,
                        reason: "User turn truncated to fit budget".into(),
                    });
                }
            }
        }

        // ── Build turn list ────────────────────────────────────────────────
        let kept_history = &input.history[history_start..];
        let mut turns = Vec::with_capacity(kept_history.len() + 2);
        if let Some(text) = system_text {
            turns.push(PromptTurn {
                role: Role::System,
                text,
                token_count: system_tokens,
                sequence_number: None,
            });
        }
        turns.extend(kept_history.iter().map(PromptTurn::from));
        turns.push(PromptTurn {
            role: Role::User,
            text: user_text,
            token_count: user_tokens,
            sequence_number: Some(input.user_turn.sequence_number),
        });

        // ── Metadata ───────────────────────────────────────────────────────
        let history_total = input.history.len() + input.history_drop.map_or(0, |d| d.dropped_count);
        let per_section = vec![
            SectionStats {
                name: "grounding".into(),
                tokens: system_tokens,
                items_included: chunks.len(),
                items_total: chunks_total,
            },
            SectionStats {
                name: "history".into(),
                tokens: history_tokens,
                items_included: kept_history.len(),
                items_total: history_total,
            },
            SectionStats {
                name: "user".into(),
                tokens: user_tokens,
                items_included: 1,
                items_total: 1,
            },
        ];

        let total_tokens = system_tokens + history_tokens + user_tokens;
        debug_assert!(total_tokens <= max);
        let utilization_pct = if max == 0 {
            0.0
        } else {
            (total_tokens as f32 / max as f32) * 100.0
        };

        debug!(
            total_tokens,
            budget = max,
            chunks = chunks.len(),
            history = kept_history.len(),
            "Prompt assembled"
        );

        Ok(AssembledPrompt {
            turns,
            total_tokens,
            included_chunk_ids: chunks.iter().map(|s| s.chunk.id()).collect(),
            user_turn_truncated,
            history_drop,
            metadata: AssemblyMetadata {
                budget: max,
                utilization_pct,
                per_section,
                drops,
                history_window_target: self.budget.history_window_target,
            },
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn maybe_drop(section: &str, dropped: usize, tokens: usize, reason: &str) -> Option<DropInfo> {
        if dropped > 0 {
            Some(DropInfo {
                section: section.into(),
                items_dropped: dropped,
                tokens_dropped: tokens,
                reason: reason.into(),
            })
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
