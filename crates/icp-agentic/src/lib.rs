//! LLM capability boundary for the ICP query workflow
//!
//! This crate owns every call that leaves the process for a language model.
//! It has no database dependencies - the workflow engine, SQL validation and
//! query execution live in `icp-query`.
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API

pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod llm_client;
pub mod openai_client;
pub mod scripted;
pub mod structured;

pub use backend::AgentBackend;
pub use client_factory::{build_client, create_llm_client, create_llm_client_with_key};
pub use llm_client::{LlmClient, ToolCallResult, ToolDefinition};
pub use scripted::ScriptedClient;
pub use structured::{invoke_structured, strip_code_blocks};
