//! OpenAI Chat Completions backend.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::llm_client::{LlmClient, ToolCallResult, ToolDefinition};

const DEFAULT_MODEL: &str = "gpt-4o";

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<FunctionInvocation>,
}

#[derive(Deserialize)]
struct FunctionInvocation {
    function: FunctionPayload,
}

#[derive(Deserialize)]
struct FunctionPayload {
    name: String,
    /// JSON encoded as a string
    arguments: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> Self {
        OpenAiClient {
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
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ]
        })
    }

    async fn complete(&self, body: &Value) -> Result<AssistantMessage> {
        let response = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {status}: {detail}");
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .context("OpenAI response was not valid JSON")?;
        first_message(parsed)
    }
}

fn first_message(response: CompletionResponse) -> Result<AssistantMessage> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| anyhow!("OpenAI returned no choices"))
}

fn tool_call_from(message: AssistantMessage) -> Result<ToolCallResult> {
    let Some(invocation) = message.tool_calls.into_iter().next() else {
        bail!("OpenAI answered without calling the requested function");
    };
    let FunctionPayload { name, arguments } = invocation.function;
    tracing::debug!(function = %name, %arguments, "openai function call");
    let arguments: Value = serde_json::from_str(&arguments)
        .with_context(|| format!("arguments for '{name}' are not valid JSON"))?;
    Ok(ToolCallResult {
        tool_name: name,
        arguments,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = self.request(system_prompt, user_prompt);
        let message = self.complete(&body).await?;
        match message.content {
            Some(text) if !text.is_empty() => Ok(text),
            _ => bail!("OpenAI returned an empty message"),
        }
    }

    async fn chat_with_tool(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tool: &ToolDefinition,
    ) -> Result<ToolCallResult> {
        let mut body = self.request(system_prompt, user_prompt);
        body["tools"] = json!([{
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters
            }
        }]);
        body["tool_choice"] = json!({"type": "function", "function": {"name": tool.name}});

        let message = self.complete(&body).await?;
        tool_call_from(message)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}
