//! Anthropic Messages API backend.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::llm_client::{LlmClient, ToolCallResult, ToolDefinition};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Characters of raw response kept in debug logs
const LOGGED_RESPONSE_CHARS: usize = 1000;

#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    http: reqwest::Client,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<Block>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Ignored,
}

impl MessagesResponse {
    fn joined_text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn first_tool_use(self) -> Option<ToolCallResult> {
        self.content.into_iter().find_map(|block| match block {
            Block::ToolUse { name, input } => Some(ToolCallResult {
                tool_name: name,
                arguments: input,
            }),
            _ => None,
        })
    }
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> Self {
        AnthropicClient {
            api_key,
            http: reqwest::Client::new(),
            model: model.to_string(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request(&self, system_prompt: &str, user_prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}]
        })
    }

    async fn send(&self, body: &Value) -> Result<MessagesResponse> {
        let response = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Anthropic API error {status}: {raw}");
        }
        tracing::debug!(body = %prefix(&raw, LOGGED_RESPONSE_CHARS), "anthropic response");

        serde_json::from_str(&raw).context("Anthropic response did not match the Messages schema")
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = self.request(system_prompt, user_prompt);
        let text = self.send(&body).await?.joined_text();
        if text.is_empty() {
            bail!("Anthropic returned no text content");
        }
        Ok(text)
    }

    async fn chat_with_tool(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tool: &ToolDefinition,
    ) -> Result<ToolCallResult> {
        let mut body = self.request(system_prompt, user_prompt);
        body["tools"] = json!([{
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters
        }]);
        body["tool_choice"] = json!({"type": "tool", "name": tool.name});

        match self.send(&body).await?.first_tool_use() {
            Some(call) => Ok(call),
            None => bail!("Anthropic answered without a tool_use block for '{}'", tool.name),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }
}

fn prefix(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
