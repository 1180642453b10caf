//! Structured output helpers
//!
//! `invoke_structured` forces a tool call and deserializes the arguments into
//! the caller's schema type. A call either yields a complete instance or an
//! error; there is no partial result.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

use crate::llm_client::{LlmClient, ToolDefinition};

/// Call `tool` and deserialize its arguments as `T`
pub async fn invoke_structured<T: DeserializeOwned>(
    client: &dyn LlmClient,
    system_prompt: &str,
    user_prompt: &str,
    tool: &ToolDefinition,
) -> Result<T> {
    let result = client
        .chat_with_tool(system_prompt, user_prompt, tool)
        .await?;

    if result.tool_name != tool.name {
        return Err(anyhow!(
            "Expected tool '{}' but model called '{}'",
            tool.name,
            result.tool_name
        ));
    }

    serde_json::from_value(result.arguments.clone()).map_err(|e| {
        anyhow!(
            "Failed to parse {} arguments: {}\n\nJSON: {}",
            tool.name,
            e,
            result.arguments
        )
    })
}

/// Strip a markdown code fence wrapping (```sql ... ``` or ``` ... ```)
///
/// Text without a fence is returned trimmed.
pub fn strip_code_blocks(text: &str) -> String {
    let text = text.trim();
    let Some(start) = text.find("```") else {
        return text.to_string();
    };

    let after_open = &text[start + 3..];
    // Skip the info string (e.g. "sql") up to the end of the opening line
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => strip_sql_tag(after_open),
    };
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// Drop a leading `sql` info tag from a one-line fence body
fn strip_sql_tag(body: &str) -> &str {
    let trimmed = body.trim_start();
    match trimmed.get(..3) {
        Some(tag)
            if tag.eq_ignore_ascii_case("sql")
                && trimmed[3..].chars().next().map_or(true, char::is_whitespace) =>
        {
            &trimmed[3..]
        }
        _ => body,
    }
}
