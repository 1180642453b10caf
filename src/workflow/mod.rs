//! Conversational text-to-SQL workflow
//!
//! One `WorkflowState` per thread flows through extraction, completeness,
//! clarification, industry and title resolution, SQL synthesis and the
//! safety validator. `QueryAssistant` is the caller-facing entry point.

pub mod cache;
pub mod clarification;
pub mod completeness;
pub mod engine;
pub mod extraction;
pub mod fields;
pub mod industry;
pub mod memory;
pub mod service;
pub mod sql_synthesis;
pub mod state;
pub mod title_tier;

pub use engine::{Engine, EngineBuilder, Stage};
pub use fields::{ExtractedInfo, Field, FieldValue};
pub use memory::{ConversationContext, ConversationTurn, Correction};
pub use service::QueryAssistant;
pub use state::{
    ChatMessage, Role, SicContext, TitleCondition, TurnOutcome, WorkflowMode, WorkflowState,
};
pub use title_tier::{Tier, TitleTierResolver};
