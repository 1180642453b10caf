//! Workflow State Types
//!
//! `WorkflowState` is the aggregate root for one conversation thread. It is
//! serialized whole into the checkpoint store between turns.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fields::{ExtractedInfo, Field};
use super::memory::ConversationContext;

/// Coarse progress tag for a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    #[default]
    Extracting,
    Clarifying,
    Generating,
    Updating,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Raw message log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Resolved industry filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SicContext {
    /// Industry description actually sent for resolution
    pub industry_input: String,
    /// Deduplicated 4-digit codes, in first-seen order
    pub codes: Vec<String>,
    pub rationale: String,
}

impl SicContext {
    /// `industry IN ('7342', ...)`
    pub fn sql_condition(&self) -> String {
        let quoted: Vec<String> = self.codes.iter().map(|c| format!("'{}'", c)).collect();
        format!("industry IN ({})", quoted.join(", "))
    }
}

/// Resolved title-tier filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleCondition {
    /// Title text the predicate was derived from
    pub title_input: String,
    /// e.g. `title_tier = 'tier_i'` or `(title_tier = 'tier_i' OR title_tier = 'tier_ii')`
    pub predicate: String,
}

/// One extraction attempt, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub input: String,
    /// Raw capability output, `None` when the call failed
    pub raw: Option<serde_json::Value>,
    pub is_update: bool,
    pub at: DateTime<Utc>,
}

/// Per-thread aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub thread_id: String,
    pub messages: Vec<ChatMessage>,
    pub conversation: ConversationContext,
    pub extracted: ExtractedInfo,
    /// Fields the user addressed on the most recent turn
    pub mentioned_fields: BTreeSet<Field>,
    pub extraction_history: Vec<ExtractionRecord>,
    pub sic_context: Option<SicContext>,
    pub title_condition: Option<TitleCondition>,
    pub missing_fields: Vec<Field>,
    pub sql_query: Option<String>,
    pub sql_valid: Option<bool>,
    pub sql_error: Option<String>,
    /// Structural mismatches between the SQL and the resolved filters
    #[serde(default)]
    pub sql_warnings: Vec<String>,
    pub mode: WorkflowMode,
    pub needs_human_input: bool,
    pub pending_question: Option<String>,
    /// Contextual and follow-up questions asked so far
    #[serde(default)]
    pub contextual_questions_asked: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            conversation: ConversationContext::default(),
            extracted: ExtractedInfo::default(),
            mentioned_fields: BTreeSet::new(),
            extraction_history: Vec::new(),
            sic_context: None,
            title_condition: None,
            missing_fields: Vec::new(),
            sql_query: None,
            sql_valid: None,
            sql_error: None,
            sql_warnings: Vec::new(),
            mode: WorkflowMode::Extracting,
            needs_human_input: false,
            pending_question: None,
            contextual_questions_asked: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// SQL that passed the safety validator
    pub fn validated_sql(&self) -> Option<&str> {
        match (self.sql_query.as_deref(), self.sql_valid) {
            (Some(sql), Some(true)) => Some(sql),
            _ => None,
        }
    }

    pub fn transition_to(&mut self, mode: WorkflowMode) {
        if self.mode != mode {
            debug!(thread_id = %self.thread_id, from = ?self.mode, to = ?mode, "mode transition");
        }
        self.mode = mode;
        self.updated_at = Utc::now();
    }

    /// Drop the current SQL so it is regenerated from the updated filters
    pub fn clear_sql(&mut self) {
        self.sql_query = None;
        self.sql_valid = None;
        self.sql_error = None;
        self.sql_warnings.clear();
    }

    /// Record a turn-ending failure without touching the rest of the state
    pub fn fail(&mut self, message: impl Into<String>) {
        self.sql_error = Some(message.into());
        self.sql_valid = Some(false);
    }

    /// Externally relevant projection returned to callers
    pub fn outcome(&self) -> TurnOutcome {
        TurnOutcome {
            thread_id: self.thread_id.clone(),
            messages: self.messages.clone(),
            sql_query: self.sql_query.clone(),
            sql_valid: self.sql_valid,
            sql_error: self.sql_error.clone(),
            sql_warnings: self.sql_warnings.clone(),
            extracted: self.extracted.clone(),
            sic_context: self.sic_context.clone(),
            title_condition: self.title_condition.clone(),
            missing_fields: self.missing_fields.clone(),
            pending_question: self.pending_question.clone(),
            needs_human_input: self.needs_human_input,
            mode: self.mode,
        }
    }
}

/// What a caller sees after a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub messages: Vec<ChatMessage>,
    pub sql_query: Option<String>,
    pub sql_valid: Option<bool>,
    pub sql_error: Option<String>,
    pub sql_warnings: Vec<String>,
    pub extracted: ExtractedInfo,
    pub sic_context: Option<SicContext>,
    pub title_condition: Option<TitleCondition>,
    pub missing_fields: Vec<Field>,
    pub pending_question: Option<String>,
    pub needs_human_input: bool,
    pub mode: WorkflowMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sic_condition_format() {
        let ctx = SicContext {
            industry_input: "pest control".into(),
            codes: vec!["7342".into(), "0782".into()],
            rationale: String::new(),
        };
        assert_eq!(ctx.sql_condition(), "industry IN ('7342', '0782')");
    }

    #[test]
    fn test_validated_sql_requires_valid_flag() {
        let mut state = WorkflowState::new("t1");
        state.sql_query = Some("SELECT 1".into());
        assert_eq!(state.validated_sql(), None);
        state.sql_valid = Some(true);
        assert_eq!(state.validated_sql(), Some("SELECT 1"));
        state.fail("boom");
        assert_eq!(state.validated_sql(), None);
        assert_eq!(state.sql_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = WorkflowState::new("t1");
        state.mentioned_fields.insert(Field::Industry);
        state.transition_to(WorkflowMode::Clarifying);
        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
