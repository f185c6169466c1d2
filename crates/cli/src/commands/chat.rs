//! `parley chat`: answer one user turn through the configured provider.

use std::path::Path;

use parley_chat::{ChatService, ChatSettings, SummarizationOutcome};
use parley_config::AppConfig;
use tracing::{info, warn};

use super::{open_index, print_json};
use crate::request::RequestFile;

pub async fn run(
    config: &AppConfig,
    path: &Path,
    summarize: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = RequestFile::read(path)?.into_chat_request();
    let provider = parley_providers::build_from_config(&config.inference)?;
    let index = open_index(&config.index).await?;

    let service = ChatService::new(provider, ChatSettings::from_config(config)).with_index(index);

    let conversation_id = request.conversation_id.clone();
    let mut history = request.history.clone();
    let reply = service.respond(request).await?;
    print_json(&reply)?;

    if summarize && reply.summarization_requested.is_some() {
        history.push(reply.user_turn.clone());
        history.push(reply.assistant_turn.clone());
        match service.summarize(&conversation_id, &history).await {
            SummarizationOutcome::Applied {
                covered_through,
                summary_tokens,
            } => info!(covered_through, summary_tokens, "Dropped history condensed"),
            SummarizationOutcome::Failed { attempts, error } => {
                warn!(attempts, error = %error, "Could not condense dropped history")
            }
            other => info!(outcome = ?other, "No summary applied"),
        }
    }

    Ok(())
}
