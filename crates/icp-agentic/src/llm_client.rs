//! The capability seam every workflow stage talks to.
//!
//! Stages either want free text back (SQL synthesis) or a JSON object that
//! matches a schema (extraction, clarification, industry mapping). Both
//! providers can force the second form, so it is part of the trait.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named JSON schema the model must answer with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the expected arguments
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// What came back from a forced tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Name the model reported; checked against the requested tool by
    /// [`crate::invoke_structured`]
    pub tool_name: String,
    pub arguments: Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain completion. Returns the model's text verbatim.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Completion constrained to `tool`'s schema.
    ///
    /// Errors if the provider answers without calling the tool. A failure
    /// never yields partial arguments.
    async fn chat_with_tool(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tool: &ToolDefinition,
    ) -> Result<ToolCallResult>;

    fn model_name(&self) -> &str;

    fn provider_name(&self) -> &str;
}
