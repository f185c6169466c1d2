//! Context assembly for a grounded chat backend.
//!
//! Builds a bounded-size prompt for every inbound user turn from prior
//! conversation turns and, in grounded mode, ranked document fragments.
//!
//! # Components (leaves first)
//!
//! | Component | Module | Responsibility |
//! |-----------|--------|----------------|
//! | Token estimator | [`token`] | `ceil(chars / 4)`, shared by every stage |
//! | Chunk retriever | [`retriever`] | Lexical ranking, top-k, degraded fallback |
//! | History windower | [`window`] | Newest contiguous suffix under a budget |
//! | Summary tracker | [`summary`] | NONE → PENDING → APPLIED per conversation |
//! | Prompt assembler | [`assembler`] | Final ordering and truncation policy |
//!
//! [`pipeline::ContextPipeline`] wires them together for one request.
//! Everything here is synchronous and pure except
//! [`retriever::ChunkRetriever::retrieve`], which consults the full-text index.

pub mod assembler;
pub mod chunker;
pub mod pipeline;
pub mod retriever;
pub mod summary;
pub mod token;
pub mod window;

pub use assembler::{
    AssembledPrompt, AssemblyError, AssemblyInput, AssemblyMetadata, DropInfo, PromptAssembler,
    PromptTurn, SectionStats,
};
pub use chunker::chunk_document;
pub use pipeline::{ContextPipeline, PipelineInput};
pub use retriever::{ChunkRetriever, RetrievalResult, ScoredChunk};
pub use summary::{
    AppliedSummary, DroppedRange, SummaryError, SummaryPolicy, SummaryRegistry, SummaryState,
    SummaryStatus, SummaryTracker, Transition,
};
pub use window::{HistoryDrop, HistoryWindow, HistoryWindower};
