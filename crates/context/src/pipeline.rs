//! One assembly request, end to end.
//!
//! Order of operations:
//!
//! 1. Validate sequence numbers
//! 2. Project history through the conversation's summary tracker
//! 3. Reserve the user turn and the rendered grounding turn
//! 4. Window history into what remains (`B`)
//! 5. Hand everything to the [`PromptAssembler`]
//!
//! Retrieval happens before this (it is the only async step); its result is
//! passed in. History is never re-expanded after the assembler drops chunks.

use parley_core::{ChatMode, ConversationBudget, Turn, UserTurnOverflow};
use tracing::debug;

use crate::assembler::{AssembledPrompt, AssemblyError, AssemblyInput, PromptAssembler};
use crate::retriever::RetrievalResult;
use crate::summary::SummaryTracker;
use crate::window::{HistoryWindow, HistoryWindower, check_sequence};

#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    pub mode: ChatMode,
    /// Full stored history, oldest first.
    pub history: &'a [Turn],
    pub user_turn: &'a Turn,
    pub retrieval: &'a RetrievalResult,
    /// Summary state for this conversation, if it has any.
    pub summary: Option<&'a SummaryTracker>,
}

#[derive(Debug, Clone)]
pub struct ContextPipeline {
    assembler: PromptAssembler,
}

impl ContextPipeline {
    pub fn new(budget: ConversationBudget) -> Self {
        Self {
            assembler: PromptAssembler::new(budget),
        }
    }

    pub fn with_overflow_policy(mut self, overflow: UserTurnOverflow) -> Self {
        self.assembler = self.assembler.with_overflow_policy(overflow);
        self
    }

    pub fn budget(&self) -> &ConversationBudget {
        self.assembler.budget()
    }

    /// Tokens left for history once the user and system turns are reserved.
    pub fn history_budget(&self, user_tokens: usize, system_tokens: usize) -> usize {
        self.budget()
            .max_context_tokens
            .saturating_sub(user_tokens.saturating_add(system_tokens))
    }

    /// Project and window history without assembling.
    pub fn window(&self, input: &PipelineInput<'_>) -> Result<HistoryWindow, AssemblyError> {
        check_sequence(input.history, input.user_turn)
            .map_err(|(previous, next)| AssemblyError::NonMonotonicHistory { previous, next })?;

        let projected = match input.summary {
            Some(tracker) => tracker.project(input.history),
            None => input.history.to_vec(),
        };

        let system_tokens = if input.mode.is_grounded() {
            PromptAssembler::render_grounding(&input.retrieval.chunks)
                .map_or(0, |s| crate::token::estimate_tokens(&s))
        } else {
            0
        };
        let budget = self.history_budget(input.user_turn.token_count(), system_tokens);
        let window = HistoryWindower::new(budget).apply(&projected);

        if let Some(target) = self.budget().history_window_target {
            debug!(
                target,
                actual = window.tokens,
                available = budget,
                "History window against target"
            );
        }
        Ok(window)
    }

    pub fn assemble(&self, input: &PipelineInput<'_>) -> Result<AssembledPrompt, AssemblyError> {
        let window = self.window(input)?;
        self.assembler.assemble(&AssemblyInput {
            mode: input.mode,
            retrieval: input.retrieval,
            history: &window.turns,
            history_drop: window.dropped.as_ref(),
            user_turn: input.user_turn,
        })
    }
}
