//! Per-request token budget.

use serde::{Deserialize, Serialize};

/// Default number of chunks retrieved for grounded chat.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 5;

/// Default hard cap on the assembled prompt.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4000;

/// Budget configuration supplied with every assembly request. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationBudget {
    /// Hard cap on the total estimated tokens of the assembled prompt.
    pub max_context_tokens: usize,

    /// Desired history size. Informational: reported, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window_target: Option<usize>,

    /// Maximum number of chunks the retriever may return.
    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,
}

/// What the assembler does when the new user turn alone exceeds the budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserTurnOverflow {
    /// Reject the request with a context overflow error.
    #[default]
    Reject,
    /// Cut the user text to fit and flag the prompt as altered.
    Truncate,
}

/// Whether an applied summary may be re-summarized once it is dropped again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResummarizePolicy {
    /// The next qualifying drop re-enters PENDING.
    #[default]
    OnDrop,
    /// Once applied, a summary is never replaced.
    Never,
}

fn default_top_k() -> usize {
    DEFAULT_RETRIEVAL_TOP_K
}

impl ConversationBudget {
    pub fn new(max_context_tokens: usize) -> Self {
        Self {
            max_context_tokens,
            ..Self::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.retrieval_top_k = top_k;
        self
    }

    pub fn with_history_target(mut self, target: usize) -> Self {
        self.history_window_target = Some(target);
        self
    }
}

impl Default for ConversationBudget {
    fn default() -> Self {
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            history_window_target: None,
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }
}
