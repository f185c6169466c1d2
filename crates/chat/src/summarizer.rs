//! Prompt construction for condensing dropped history.

use parley_core::Role;
use parley_core::Turn;
use parley_core::provider::{ProviderMessage, ProviderRequest};

/// Instruction sent as the system message of a summarization request.
pub const SUMMARIZER_INSTRUCTION: &str = "You condense chat history. Summarize the conversation excerpt below in a few sentences, \
keeping names, facts and decisions the assistant may need later. Reply with the summary only.";

/// Upper bound on the generated summary length.
pub const SUMMARY_MAX_TOKENS: u32 = 256;

/// Render turns as a plain transcript, one `role: text` line per turn.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_request(turns: &[Turn], model: &str, temperature: f32) -> ProviderRequest {
    ProviderRequest {
        model: model.to_string(),
        messages: vec![
            ProviderMessage::new(Role::System, SUMMARIZER_INSTRUCTION),
            ProviderMessage::new(Role::User, transcript(turns)),
        ],
        temperature,
        max_tokens: Some(SUMMARY_MAX_TOKENS),
    }
}
