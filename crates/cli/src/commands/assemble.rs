//! `parley assemble`: dry-run context assembly.
//!
//! Runs retrieval and the context pipeline exactly as `chat` would, then
//! prints the assembled prompt instead of sending it.

use std::path::Path;

use parley_config::AppConfig;
use parley_context::{ChunkRetriever, ContextPipeline, PipelineInput, RetrievalResult};
use tracing::warn;

use super::{open_index, print_json};
use crate::request::RequestFile;

pub async fn run(config: &AppConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let request = RequestFile::read(path)?.into_chat_request();
    let budget = request
        .budget
        .clone()
        .unwrap_or_else(|| config.context.budget());

    let retrieval = if request.mode.is_grounded() {
        let index = open_index(&config.index).await?;
        let mut load_failed = false;
        let candidates = if request.candidates.is_empty() && !request.document_ids.is_empty() {
            match index.chunks_for_documents(&request.document_ids).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(backend = index.name(), error = %e, "Could not load document chunks");
                    load_failed = true;
                    Vec::new()
                }
            }
        } else {
            request.candidates.clone()
        };
        let mut result = ChunkRetriever::from_budget(&budget)
            .retrieve(Some(&*index), &request.user_text, &candidates)
            .await;
        result.degraded |= load_failed;
        result
    } else {
        RetrievalResult::empty()
    };

    let user_turn = request.user_turn();
    let prompt = ContextPipeline::new(budget)
        .with_overflow_policy(config.context.user_turn_overflow)
        .assemble(&PipelineInput {
            mode: request.mode,
            history: &request.history,
            user_turn: &user_turn,
            retrieval: &retrieval,
            summary: None,
        })?;

    print_json(&prompt)
}
