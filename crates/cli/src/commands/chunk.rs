//! `parley chunk`: split a document and optionally index it.

use std::path::Path;

use parley_config::AppConfig;
use parley_context::chunk_document;
use tracing::info;

use super::{open_index, print_json};

pub async fn run(
    config: &AppConfig,
    document_id: &str,
    file: &Path,
    target: Option<usize>,
    index: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let target = target.unwrap_or(config.context.chunk_target_tokens);
    if target == 0 {
        return Err("--target must be > 0".into());
    }

    let chunks = chunk_document(document_id, &text, target);

    if index {
        let backend = open_index(&config.index).await?;
        let stored = backend.index_chunks(&chunks).await?;
        info!(backend = backend.name(), document_id, stored, "Chunks indexed");
    }

    print_json(&chunks)
}
