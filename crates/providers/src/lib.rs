//! Inference provider implementations for Parley.
//!
//! All providers implement the `parley_core::Provider` trait.
//! [`factory::build_from_config`] selects one based on configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::build_from_config;
pub use openai_compat::OpenAiCompatProvider;
