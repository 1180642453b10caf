//! ICP Query - conversational text-to-SQL over the prospect table
//!
//! A user describes who they want to reach ("I sell commercial cleaning in
//! Texas"). Each turn extracts the filter fields, asks at most one
//! clarifying question, resolves the industry to buyer classification codes
//! and the job title to a seniority tier, synthesises one SQL statement and
//! runs it through a deterministic safety validator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use icp_query::checkpoint::InMemoryCheckpointStore;
//! use icp_query::config::{LlmSettings, WorkflowConfig};
//! use icp_query::workflow::{Engine, QueryAssistant};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = LlmSettings::from_env()?.client();
//! let engine = Engine::builder(client).config(WorkflowConfig::load()?).build();
//! let assistant = QueryAssistant::new(engine, Arc::new(InMemoryCheckpointStore::new()));
//!
//! let outcome = assistant
//!     .handle_turn("demo", "I sell commercial cleaning services in Texas")
//!     .await?;
//! if let Some(question) = outcome.pending_question {
//!     println!("{}", question);
//! }
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Configuration (YAML workflow settings, LLM settings from env)
pub mod config;

// LLM capability boundary
pub mod agentic;

// SQL comment handling and the safety validator
pub mod sql;

// Schema introspection and query execution
pub mod database;

// Per-thread state persistence
pub mod checkpoint;

// Conversational workflow engine
pub mod workflow;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use config::{LlmSettings, WorkflowConfig};
pub use error::{CheckpointError, ConfigError, ExecutionError, WorkflowError};
pub use sql::{SqlSafetyValidator, UnsafeSql};
pub use workflow::{Engine, QueryAssistant, TurnOutcome, WorkflowState};
