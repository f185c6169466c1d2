//! Provider construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use parley_config::InferenceConfig;
use parley_core::error::ProviderError;
use parley_core::provider::Provider;
use tracing::info;

use crate::openai_compat::OpenAiCompatProvider;

/// Providers that run locally and accept any key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

/// Build the configured inference provider.
///
/// Hosted providers without an API key are rejected with `NotConfigured`.
pub fn build_from_config(config: &InferenceConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.as_str();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));

    let api_key = match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => key.to_string(),
        None if KEYLESS_PROVIDERS.contains(&name) => name.to_string(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "No API key for provider '{name}'. Set inference.api_key or PARLEY_API_KEY"
            )));
        }
    };

    info!(provider = name, base_url = %base_url, model = %config.model, "Inference provider configured");
    Ok(Arc::new(OpenAiCompatProvider::with_timeout(
        name,
        base_url,
        api_key,
        Duration::from_secs(config.timeout_secs.max(1)),
    )))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
