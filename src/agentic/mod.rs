//! LLM capability boundary
//!
//! Re-exports the `icp-agentic` crate so workflow code depends on a single
//! path for every model call.

pub use icp_agentic::anthropic_client::AnthropicClient;
pub use icp_agentic::openai_client::OpenAiClient;
pub use icp_agentic::{
    build_client, create_llm_client, create_llm_client_with_key, invoke_structured, strip_code_blocks,
    AgentBackend, LlmClient, ScriptedClient, ToolCallResult, ToolDefinition,
};
