//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat backend.
//! This crate has **no framework dependencies**: it defines the value objects
//! (turns, chunks, budgets) and the collaborator seams (inference provider,
//! full-text chunk index, event bus) that every other crate builds on.
//!
//! ## Design Philosophy
//!
//! Each external collaborator is a trait here. Implementations live in their
//! respective crates, so the assembly core can be exercised with in-memory
//! stand-ins and the service layer can swap backends through configuration.

pub mod budget;
pub mod chunk;
pub mod error;
pub mod event;
pub mod index;
pub mod provider;
pub mod token;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use budget::{ConversationBudget, ResummarizePolicy, UserTurnOverflow};
pub use chunk::{Chunk, ChunkId};
pub use error::{IndexError, ProviderError};
pub use event::{DomainEvent, EventBus};
pub use index::{ChunkIndex, ChunkRank};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use token::estimate_tokens;
pub use turn::{ChatMode, ConversationId, Role, Turn};
