//! Construct the provider client named by the environment.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::anthropic_client::AnthropicClient;
use crate::backend::AgentBackend;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Client for `AGENT_BACKEND`, keyed from that backend's API key variable
/// and honouring its model override when set.
pub fn create_llm_client() -> Result<Arc<dyn LlmClient>> {
    let backend = AgentBackend::from_env()?;
    let api_key = std::env::var(backend.api_key_var())
        .map_err(|_| anyhow!("{} environment variable not set", backend.api_key_var()))?;
    let model = std::env::var(backend.model_var()).ok();
    Ok(build_client(backend, api_key, model.as_deref()))
}

/// Same as [`create_llm_client`] with the key supplied by the caller.
pub fn create_llm_client_with_key(api_key: String) -> Result<Arc<dyn LlmClient>> {
    let backend = AgentBackend::from_env()?;
    let model = std::env::var(backend.model_var()).ok();
    Ok(build_client(backend, api_key, model.as_deref()))
}

pub fn build_client(
    backend: AgentBackend,
    api_key: String,
    model: Option<&str>,
) -> Arc<dyn LlmClient> {
    let model = model.map(str::trim).filter(|m| !m.is_empty());
    let client: Arc<dyn LlmClient> = match (backend, model) {
        (AgentBackend::Anthropic, Some(m)) => Arc::new(AnthropicClient::with_model(api_key, m)),
        (AgentBackend::Anthropic, None) => Arc::new(AnthropicClient::new(api_key)),
        (AgentBackend::OpenAi, Some(m)) => Arc::new(OpenAiClient::with_model(api_key, m)),
        (AgentBackend::OpenAi, None) => Arc::new(OpenAiClient::new(api_key)),
    };
    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "llm client ready"
    );
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_model_override_falls_back_to_default() {
        let client = build_client(AgentBackend::OpenAi, "k".into(), Some("  "));
        assert_eq!(client.provider_name(), "OpenAI");
        let pinned = build_client(AgentBackend::Anthropic, "k".into(), Some("claude-test"));
        assert_eq!(pinned.model_name(), "claude-test");
    }
}
