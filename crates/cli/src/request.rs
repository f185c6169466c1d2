//! The JSON request file accepted by `assemble` and `chat`.
//!
//! Token counts are never read from the file; they are recomputed from the
//! text so every budget decision uses the same estimator.

use std::io::Read;
use std::path::Path;

use parley_chat::ChatRequest;
use parley_core::{ChatMode, Chunk, ConversationBudget, ConversationId, Role, Turn};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RequestFile {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub history: Vec<TurnEntry>,
    pub user_text: String,
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub candidates: Vec<ChunkEntry>,
    #[serde(default)]
    pub budget: Option<ConversationBudget>,
}

#[derive(Debug, Deserialize)]
pub struct TurnEntry {
    pub role: Role,
    pub text: String,
    pub sequence_number: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChunkEntry {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
}

impl RequestFile {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Read a request from `path`, or from stdin when `path` is `-`.
    pub fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = if path == Path::new("-") {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?
        };
        Ok(Self::parse(&raw)?)
    }

    pub fn into_chat_request(self) -> ChatRequest {
        let conversation_id = self
            .conversation_id
            .map(|id| ConversationId::from(&id))
            .unwrap_or_default();

        let mut request = ChatRequest::new(conversation_id, self.user_text).with_history(
            self.history
                .into_iter()
                .map(|t| Turn::new(t.role, t.sequence_number, t.text))
                .collect(),
        );
        request.mode = self.mode;
        request.document_ids = self.document_ids;
        request.candidates = self
            .candidates
            .into_iter()
            .map(|c| Chunk::new(c.document_id, c.chunk_index, c.text))
            .collect();
        request.budget = self.budget;
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_defaults_to_open_mode() {
        let file = RequestFile::parse(r#"{"user_text": "hello"}"#).unwrap();
        let request = file.into_chat_request();
        assert_eq!(request.mode, ChatMode::Open);
        assert!(request.history.is_empty());
        assert_eq!(request.user_turn().sequence_number, 1);
    }

    #[test]
    fn token_counts_are_recomputed() {
        let file = RequestFile::parse(
            r#"{
                "conversation_id": "c-1",
                "mode": "grounded",
                "history": [
                    {"role": "user", "text": "abcdefgh", "sequence_number": 1, "token_count": 999},
                    {"role": "assistant", "text": "abcd", "sequence_number": 2}
                ],
                "user_text": "rust",
                "candidates": [{"document_id": "d", "chunk_index": 0, "text": "rust is fast"}],
                "budget": {"max_context_tokens": 300}
            }"#,
        )
        .unwrap();
        let request = file.into_chat_request();
        assert_eq!(request.conversation_id.to_string(), "c-1");
        assert_eq!(request.mode, ChatMode::Grounded);
        assert_eq!(request.history[0].token_count(), 2);
        assert_eq!(request.history[1].token_count(), 1);
        assert_eq!(request.candidates[0].token_count(), 3);
        assert_eq!(request.user_turn().sequence_number, 3);

        let budget = request.budget.unwrap();
        assert_eq!(budget.max_context_tokens, 300);
        assert_eq!(budget.retrieval_top_k, 5);
    }

    #[test]
    fn missing_user_text_is_rejected() {
        assert!(RequestFile::parse(r#"{"history": []}"#).is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let raw = r#"{"user_text": "x", "history": [{"role": "tool", "text": "t", "sequence_number": 1}]}"#;
        assert!(RequestFile::parse(raw).is_err());
    }
}
