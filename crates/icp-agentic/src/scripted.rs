//! Scripted LLM client
//!
//! Deterministic `LlmClient` that replays queued responses. Used by the
//! workflow's tests and for offline runs; it never touches the network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::llm_client::{LlmClient, ToolCallResult, ToolDefinition};

type Scripted<T> = std::result::Result<T, String>;

#[derive(Default)]
struct Script {
    tools: HashMap<String, VecDeque<Scripted<serde_json::Value>>>,
    tool_defaults: HashMap<String, serde_json::Value>,
    chat: VecDeque<Scripted<String>>,
    tool_calls: HashMap<String, Vec<String>>,
    chat_calls: Vec<String>,
}

/// Replays queued tool and chat responses in FIFO order
///
/// Each tool name has its own queue. When a queue is empty the tool's default
/// response (if any) is returned, otherwise the call fails.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<Script>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the arguments returned by the next call to `tool`
    pub fn push_tool_response(&self, tool: &str, arguments: serde_json::Value) {
        self.with_script(|s| {
            s.tools
                .entry(tool.to_string())
                .or_default()
                .push_back(Ok(arguments))
        });
    }

    /// Queue a failure for the next call to `tool`
    pub fn push_tool_error(&self, tool: &str, message: &str) {
        self.with_script(|s| {
            s.tools
                .entry(tool.to_string())
                .or_default()
                .push_back(Err(message.to_string()))
        });
    }

    /// Arguments returned for `tool` once its queue is drained
    pub fn set_tool_default(&self, tool: &str, arguments: serde_json::Value) {
        self.with_script(|s| {
            s.tool_defaults.insert(tool.to_string(), arguments);
        });
    }

    /// Queue the text returned by the next `chat` call
    pub fn push_chat_response(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_script(|s| s.chat.push_back(Ok(text)));
    }

    /// Queue a failure for the next `chat` call
    pub fn push_chat_error(&self, message: &str) {
        self.with_script(|s| s.chat.push_back(Err(message.to_string())));
    }

    /// Number of calls made to `tool`
    pub fn tool_call_count(&self, tool: &str) -> usize {
        self.with_script(|s| s.tool_calls.get(tool).map_or(0, Vec::len))
    }

    /// User prompts sent to `tool`, oldest first
    pub fn tool_prompts(&self, tool: &str) -> Vec<String> {
        self.with_script(|s| s.tool_calls.get(tool).cloned().unwrap_or_default())
    }

    /// Number of `chat` calls made
    pub fn chat_call_count(&self) -> usize {
        self.with_script(|s| s.chat_calls.len())
    }

    /// User prompts sent to `chat`, oldest first
    pub fn chat_prompts(&self) -> Vec<String> {
        self.with_script(|s| s.chat_calls.clone())
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        // A panic while holding the lock only happens inside a failing test
        let mut guard = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn chat(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.with_script(|s| {
            s.chat_calls.push(user_prompt.to_string());
            match s.chat.pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("no scripted chat response")),
            }
        })
    }

    async fn chat_with_tool(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        tool: &ToolDefinition,
    ) -> Result<ToolCallResult> {
        self.with_script(|s| -> Result<ToolCallResult> {
            s.tool_calls
                .entry(tool.name.clone())
                .or_default()
                .push(user_prompt.to_string());

            let next = s.tools.get_mut(&tool.name).and_then(VecDeque::pop_front);
            let arguments = match next {
                Some(Ok(arguments)) => arguments,
                Some(Err(message)) => return Err(anyhow!(message)),
                None => s
                    .tool_defaults
                    .get(&tool.name)
                    .cloned()
                    .ok_or_else(|| anyhow!("no scripted response for tool '{}'", tool.name))?,
            };

            Ok(ToolCallResult {
                tool_name: tool.name.clone(),
                arguments,
            })
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "Scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_default() {
        let client = ScriptedClient::new();
        let tool = ToolDefinition::new("t", "", serde_json::json!({}));
        client.push_tool_response("t", serde_json::json!({"n": 1}));
        client.set_tool_default("t", serde_json::json!({"n": 0}));

        let first = client.chat_with_tool("", "a", &tool).await.unwrap();
        let second = client.chat_with_tool("", "b", &tool).await.unwrap();
        assert_eq!(first.arguments["n"], 1);
        assert_eq!(second.arguments["n"], 0);
        assert_eq!(client.tool_call_count("t"), 2);
        assert_eq!(client.tool_prompts("t"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unscripted_call_fails() {
        let client = ScriptedClient::new();
        assert!(client.chat("", "x").await.is_err());
        assert_eq!(client.chat_call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let client = ScriptedClient::new();
        client.push_chat_error("rate limited");
        let err = client.chat("", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "rate limited");
    }
}
