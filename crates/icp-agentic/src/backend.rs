//! Which hosted model answers the workflow's questions.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;

/// Provider behind the [`crate::LlmClient`]. Selected with `AGENT_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentBackend {
    #[default]
    Anthropic,
    OpenAi,
}

#[derive(Debug, thiserror::Error)]
#[error("AGENT_BACKEND must be one of anthropic, claude, openai, gpt (got '{0}')")]
pub struct ParseBackendError(String);

impl AgentBackend {
    /// Reads `AGENT_BACKEND`; unset means Anthropic.
    pub fn from_env() -> Result<Self> {
        match std::env::var("AGENT_BACKEND") {
            Ok(raw) => Ok(raw.parse()?),
            Err(_) => Ok(AgentBackend::default()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "Anthropic",
            AgentBackend::OpenAi => "OpenAI",
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "ANTHROPIC_API_KEY",
            AgentBackend::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Optional override for the provider's default model
    pub fn model_var(self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "ANTHROPIC_MODEL",
            AgentBackend::OpenAi => "OPENAI_MODEL",
        }
    }
}

impl FromStr for AgentBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "anthropic" | "claude" => Ok(AgentBackend::Anthropic),
            "openai" | "gpt" => Ok(AgentBackend::OpenAi),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

impl fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
