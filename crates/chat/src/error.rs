use parley_context::AssemblyError;
use parley_core::error::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Inference failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Inference timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl ChatError {
    /// True when the request was rejected before reaching the provider
    /// because the user turn alone exceeds the budget.
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, ChatError::Assembly(AssemblyError::ContextOverflow { .. }))
    }
}
