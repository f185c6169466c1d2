pub mod assemble;
pub mod chat;
pub mod chunk;
pub mod config_cmd;

use std::sync::Arc;

use parley_config::{IndexBackend, IndexConfig};
use parley_core::ChunkIndex;
use parley_core::error::IndexError;
use parley_index::{InMemoryChunkIndex, NoopIndex, SqliteChunkIndex};

/// Open the chunk index selected by `[index] backend`.
pub async fn open_index(config: &IndexConfig) -> Result<Arc<dyn ChunkIndex>, IndexError> {
    let index: Arc<dyn ChunkIndex> = match config.backend {
        IndexBackend::Memory => Arc::new(InMemoryChunkIndex::new()),
        IndexBackend::Sqlite => Arc::new(SqliteChunkIndex::open(&config.resolved_path()).await?),
        IndexBackend::None => Arc::new(NoopIndex),
    };
    tracing::debug!(backend = index.name(), "Chunk index ready");
    Ok(index)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
