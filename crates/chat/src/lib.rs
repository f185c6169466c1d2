//! Chat service for Parley.
//!
//! Runs one request through retrieval, prompt assembly and inference, and
//! drives each conversation's summarization lifecycle.

pub mod error;
pub mod service;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::ChatError;
pub use service::{ChatReply, ChatRequest, ChatService, ChatSettings, SummarizationOutcome};
