//! Turn and conversation domain types.
//!
//! A turn is one message exchanged in a conversation. Turns are immutable once
//! created and carry the token count computed by [`crate::token::estimate_tokens`],
//! so every budget decision downstream sees the same number.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::estimate_tokens;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System-authored (grounding context, history summaries)
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Prior turns only, no document retrieval.
    #[default]
    Open,
    /// Retrieved document fragments are injected into the prompt.
    Grounded,
}

impl ChatMode {
    pub fn is_grounded(&self) -> bool {
        matches!(self, ChatMode::Grounded)
    }
}

/// A single turn in a conversation.
///
/// Deserialization ignores any serialized `token_count` and recomputes it
/// from the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TurnRecord")]
pub struct Turn {
    /// Who authored this turn
    pub role: Role,

    /// The text content
    pub text: String,

    /// Estimated token count of `text`
    token_count: usize,

    /// Position in the conversation; strictly increasing
    pub sequence_number: u64,
}

impl Turn {
    /// Create a turn, computing its token count from the text.
    pub fn new(role: Role, sequence_number: u64, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            role,
            token_count: estimate_tokens(&text),
            text,
            sequence_number,
        }
    }

    /// Estimated token count of `text`.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Create a new user turn.
    pub fn user(sequence_number: u64, text: impl Into<String>) -> Self {
        Self::new(Role::User, sequence_number, text)
    }

    /// Create a new assistant turn.
    pub fn assistant(sequence_number: u64, text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, sequence_number, text)
    }

    /// Create a new system turn.
    pub fn system(sequence_number: u64, text: impl Into<String>) -> Self {
        Self::new(Role::System, sequence_number, text)
    }
}

/// Wire form of a [`Turn`].
#[derive(Deserialize)]
struct TurnRecord {
    role: Role,
    text: String,
    sequence_number: u64,
}

impl From<TurnRecord> for Turn {
    fn from(record: TurnRecord) -> Self {
        Turn::new(record.role, record.sequence_number, record.text)
    }
}
