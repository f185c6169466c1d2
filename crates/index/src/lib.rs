//! Full-text chunk index implementations for Parley.

pub mod in_memory;
pub mod noop;
mod terms;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryChunkIndex;
pub use noop::NoopIndex;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChunkIndex;
