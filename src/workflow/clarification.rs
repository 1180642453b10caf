//! Clarification stage
//!
//! Decides whether a question is worth asking and, if so, asks the model for
//! one. A "needs clarification" answer without a usable question is treated
//! as "no clarification" so the turn keeps moving.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::fields::Field;
use super::state::WorkflowState;
use crate::agentic::{invoke_structured, LlmClient, ToolDefinition};
use crate::config::WorkflowConfig;

const SYSTEM_PROMPT: &str = include_str!("../prompts/clarification.md");

pub const CLARIFY_TOOL: &str = "clarification_decision";

/// Why the stage may ask a question this turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarifyMode {
    /// Required, recommended or conditional fields are missing
    MissingFields,
    /// Everything needed is present; an optional refinement question
    Contextual,
    /// SQL was just validated; one bounded refinement question
    FollowUp,
}

impl ClarifyMode {
    /// Contextual and follow-up questions count against the session cap
    pub fn counts_against_cap(&self) -> bool {
        !matches!(self, ClarifyMode::MissingFields)
    }
}

/// Structured decision returned by the model
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionDecision {
    pub needs_clarification: bool,
    #[serde(default)]
    pub question: Option<String>,
}

impl QuestionDecision {
    /// The question to ask, if the decision holds up
    pub fn into_question(self, min_len: usize) -> Option<String> {
        if !self.needs_clarification {
            return None;
        }
        match self.question.map(|q| q.trim().to_string()) {
            Some(q) if q.chars().count() >= min_len => Some(q),
            _ => {
                warn!("Model requested clarification but question is missing or too short");
                None
            }
        }
    }
}

/// Decision precedence for whether the stage is eligible to ask at all
pub fn eligibility(
    state: &WorkflowState,
    just_validated: bool,
    config: &WorkflowConfig,
) -> Option<ClarifyMode> {
    let under_cap = state.contextual_questions_asked < config.max_contextual_questions;

    if just_validated {
        return under_cap.then_some(ClarifyMode::FollowUp);
    }
    if !state.missing_fields.is_empty() {
        return Some(ClarifyMode::MissingFields);
    }
    let core_present = state.extracted.geography.is_set() && state.extracted.industry.is_set();
    if core_present && under_cap {
        return Some(ClarifyMode::Contextual);
    }
    None
}

pub fn clarification_tool() -> ToolDefinition {
    ToolDefinition::new(
        CLARIFY_TOOL,
        "Decide whether to ask the user one clarifying question",
        serde_json::json!({
            "type": "object",
            "properties": {
                "needs_clarification": {
                    "type": "boolean",
                    "description": "True if a clarifying question is needed, false if the information is sufficient or the user wants to proceed"
                },
                "question": {
                    "type": ["string", "null"],
                    "description": "The single question to ask. Required when needs_clarification is true, null otherwise."
                }
            },
            "required": ["needs_clarification"]
        }),
    )
}

pub struct Clarifier {
    client: Arc<dyn LlmClient>,
    tool: ToolDefinition,
}

impl Clarifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            tool: clarification_tool(),
        }
    }

    /// Ask the model for a decision; `Ok(None)` means proceed without asking
    pub async fn decide(
        &self,
        state: &WorkflowState,
        mode: ClarifyMode,
        config: &WorkflowConfig,
    ) -> anyhow::Result<Option<String>> {
        info!(
            ?mode,
            missing = ?state.missing_fields,
            questions_asked = state.conversation.questions_asked.len(),
            "Generating clarifying question"
        );
        let prompt = build_prompt(state, mode, config);
        let decision: QuestionDecision =
            invoke_structured(self.client.as_ref(), SYSTEM_PROMPT, &prompt, &self.tool).await?;
        let question = decision.into_question(config.min_question_length);
        match &question {
            Some(q) => info!("Generated question: {}", q),
            None => info!("No clarification needed"),
        }
        Ok(question)
    }
}

fn build_prompt(state: &WorkflowState, mode: ClarifyMode, config: &WorkflowConfig) -> String {
    let mut parts = Vec::new();

    let conversation = state
        .conversation
        .conversation_text(config.conversation_history_limit);
    parts.push(format!("Recent conversation:\n{}", conversation));

    if !state.conversation.questions_asked.is_empty() {
        parts.push(format!(
            "Questions already asked: {}",
            state.conversation.questions_asked.join(", ")
        ));
        parts.push(format!(
            "Context summary:\n{}",
            state.conversation.summary(config)
        ));
    }

    let missing = if mode == ClarifyMode::FollowUp || state.missing_fields.is_empty() {
        "None".to_string()
    } else {
        state
            .missing_fields
            .iter()
            .map(Field::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let extracted = serde_json::to_string_pretty(&state.extracted.to_json())
        .unwrap_or_else(|_| "{}".to_string());

    parts.push(format!("Extracted information:\n{}", extracted));
    parts.push(format!("Missing fields: {}", missing));
    parts.push(format!(
        "Contextual mode: {}",
        mode != ClarifyMode::MissingFields
    ));
    parts.push(format!(
        "SQL already generated: {}",
        mode == ClarifyMode::FollowUp
    ));

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::fields::FieldValue;

    #[test]
    fn test_short_question_is_downgraded() {
        let decision = QuestionDecision {
            needs_clarification: true,
            question: Some("Title?".into()),
        };
        assert_eq!(decision.into_question(10), None);
    }

    #[test]
    fn test_missing_question_is_downgraded() {
        let decision = QuestionDecision {
            needs_clarification: true,
            question: None,
        };
        assert_eq!(decision.into_question(10), None);
    }

    #[test]
    fn test_no_clarification_drops_stray_question() {
        let decision = QuestionDecision {
            needs_clarification: false,
            question: Some("Which titles should we target?".into()),
        };
        assert_eq!(decision.into_question(10), None);
    }

    #[test]
    fn test_eligibility_precedence() {
        let config = WorkflowConfig::default();
        let mut state = WorkflowState::new("t");
        state.missing_fields = vec![Field::Title];
        assert_eq!(eligibility(&state, false, &config), Some(ClarifyMode::MissingFields));

        state.missing_fields.clear();
        assert_eq!(eligibility(&state, false, &config), None);

        state.extracted.geography = FieldValue::Value("Texas".into());
        state.extracted.industry = FieldValue::Value("pest control".into());
        assert_eq!(eligibility(&state, false, &config), Some(ClarifyMode::Contextual));
        assert_eq!(eligibility(&state, true, &config), Some(ClarifyMode::FollowUp));

        state.contextual_questions_asked = 1;
        assert_eq!(eligibility(&state, false, &config), None);
        assert_eq!(eligibility(&state, true, &config), None);
    }

    #[test]
    fn test_missing_fields_ignore_cap() {
        let config = WorkflowConfig::default();
        let mut state = WorkflowState::new("t");
        state.contextual_questions_asked = 5;
        state.missing_fields = vec![Field::Geography];
        assert_eq!(eligibility(&state, false, &config), Some(ClarifyMode::MissingFields));
    }
}
