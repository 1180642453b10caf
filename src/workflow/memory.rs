//! Conversation memory
//!
//! Append-only turn log plus the bounded bookkeeping that feeds prompts:
//! questions asked, answers received, field corrections and update requests.
//! Every list is FIFO-pruned to its configured bound after each mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fields::{ExtractedInfo, Field};
use super::state::{ChatMessage, Role, WorkflowState};
use crate::config::WorkflowConfig;

const UPDATE_KEYWORDS: [&str; 5] = ["update", "change", "modify", "edit", "revise"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot: Option<ExtractedInfo>,
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub field: Field,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub turns: Vec<ConversationTurn>,
    /// Distinct questions in the order they were asked
    pub questions_asked: Vec<String>,
    /// First answer received for each question
    pub answers: BTreeMap<String, String>,
    pub corrections: Vec<Correction>,
    pub update_requests: Vec<String>,
}

impl ConversationContext {
    /// Oldest question without an answer
    pub fn oldest_unanswered(&self) -> Option<&str> {
        self.questions_asked
            .iter()
            .find(|q| !self.answers.contains_key(*q))
            .map(String::as_str)
    }

    fn track_question(&mut self, question: &str) {
        if !self.questions_asked.iter().any(|q| q == question) {
            self.questions_asked.push(question.to_string());
        }
    }

    fn track_answer(&mut self, answer: &str, config: &WorkflowConfig) {
        if let Some(question) = self.oldest_unanswered().map(str::to_string) {
            debug!(
                "Tracked answer for question: {}...",
                truncate(&question, config.question_truncate_length)
            );
            self.answers.insert(question, answer.to_string());
        }
    }

    /// Record corrections between two snapshots of the same thread
    ///
    /// Only fields holding a value both before and after, with different
    /// text, count as corrections.
    pub fn track_corrections(
        &mut self,
        before: &ExtractedInfo,
        after: &ExtractedInfo,
        config: &WorkflowConfig,
    ) {
        let mut found = 0;
        for field in Field::ALL {
            if let (Some(old), Some(new)) = (before.value(field), after.value(field)) {
                if old != new {
                    self.corrections.push(Correction {
                        field,
                        old_value: old.to_string(),
                        new_value: new.to_string(),
                    });
                    found += 1;
                }
            }
        }
        if found > 0 {
            debug!("Tracked {} corrections", found);
        }
        self.prune(config);
    }

    /// FIFO-truncate every bounded list
    pub fn prune(&mut self, config: &WorkflowConfig) {
        keep_last(&mut self.turns, config.max_conversation_turns);
        if self.questions_asked.len() > config.conversation_history_limit {
            keep_last(&mut self.questions_asked, config.conversation_history_limit);
            let kept = &self.questions_asked;
            self.answers.retain(|q, _| kept.contains(q));
        }
        keep_last(&mut self.corrections, config.max_corrections_to_keep);
        keep_last(&mut self.update_requests, config.max_updates_to_keep);
    }

    /// Recent turns as `User: ...` / `Assistant: ...` lines
    pub fn conversation_text(&self, last_n: usize) -> String {
        let start = self.turns.len().saturating_sub(last_n);
        let recent = &self.turns[start..];
        if recent.is_empty() {
            return "No previous conversation.".to_string();
        }
        recent
            .iter()
            .map(|turn| {
                let label = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", label, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Questions with answers, recent corrections and update requests
    pub fn summary(&self, config: &WorkflowConfig) -> String {
        let mut parts = Vec::new();

        if !self.questions_asked.is_empty() {
            parts.push(format!("Questions asked: {}", self.questions_asked.len()));
            let start = self
                .questions_asked
                .len()
                .saturating_sub(config.max_questions_to_show);
            for (i, question) in self.questions_asked[start..].iter().enumerate() {
                let answer = self
                    .answers
                    .get(question)
                    .map(String::as_str)
                    .unwrap_or("Not answered yet");
                parts.push(format!("  Q{}: {}", i + 1, question));
                parts.push(format!("  A{}: {}", i + 1, answer));
            }
        }

        if !self.corrections.is_empty() {
            parts.push(format!("\nCorrections made: {}", self.corrections.len()));
            let start = self.corrections.len().saturating_sub(3);
            for c in &self.corrections[start..] {
                parts.push(format!("  {}: '{}' -> '{}'", c.field, c.old_value, c.new_value));
            }
        }

        if !self.update_requests.is_empty() {
            parts.push(format!("\nUpdate requests: {}", self.update_requests.len()));
            for update in &self.update_requests {
                parts.push(format!(
                    "  - {}",
                    truncate(update, config.text_truncate_length)
                ));
            }
        }

        if parts.is_empty() {
            "No conversation history yet.".to_string()
        } else {
            parts.join("\n")
        }
    }

    /// Recent user utterances, newest first
    pub fn recent_user_turns(&self, last_n: usize) -> impl Iterator<Item = &str> {
        let start = self.turns.len().saturating_sub(last_n);
        self.turns[start..]
            .iter()
            .rev()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }
}

/// Append the user's utterance to the log and update bookkeeping
pub fn record_user_turn(state: &mut WorkflowState, utterance: &str, config: &WorkflowConfig) {
    state.messages.push(ChatMessage {
        role: Role::User,
        content: utterance.to_string(),
    });

    let ctx = &mut state.conversation;
    ctx.turns.push(ConversationTurn {
        role: Role::User,
        content: utterance.to_string(),
        timestamp: Utc::now(),
        snapshot: Some(state.extracted.clone()),
        question: None,
    });
    ctx.track_answer(utterance, config);

    let lower = utterance.to_lowercase();
    if UPDATE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        debug!(
            "Tracked update request: {}...",
            truncate(utterance, config.question_truncate_length)
        );
        ctx.update_requests.push(utterance.to_string());
    }

    ctx.prune(config);
}

/// Append an assistant question to the log and track it
pub fn record_question(state: &mut WorkflowState, question: &str, config: &WorkflowConfig) {
    state.messages.push(ChatMessage {
        role: Role::Assistant,
        content: question.to_string(),
    });

    let ctx = &mut state.conversation;
    ctx.turns.push(ConversationTurn {
        role: Role::Assistant,
        content: question.to_string(),
        timestamp: Utc::now(),
        snapshot: Some(state.extracted.clone()),
        question: Some(question.to_string()),
    });
    ctx.track_question(question);
    ctx.prune(config);
}

fn keep_last<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::fields::FieldValue;

    fn config() -> WorkflowConfig {
        WorkflowConfig::default()
    }

    #[test]
    fn test_answer_matches_oldest_unanswered_question() {
        let cfg = config();
        let mut state = WorkflowState::new("t");
        record_question(&mut state, "Which region?", &cfg);
        record_question(&mut state, "Which title?", &cfg);
        record_user_turn(&mut state, "Texas", &cfg);

        let ctx = &state.conversation;
        assert_eq!(ctx.answers.get("Which region?").map(String::as_str), Some("Texas"));
        assert!(!ctx.answers.contains_key("Which title?"));
        assert_eq!(ctx.oldest_unanswered(), Some("Which title?"));
    }

    #[test]
    fn test_first_answer_is_kept() {
        let cfg = config();
        let mut state = WorkflowState::new("t");
        record_question(&mut state, "Which region?", &cfg);
        record_user_turn(&mut state, "Texas", &cfg);
        record_user_turn(&mut state, "Ohio", &cfg);
        assert_eq!(
            state.conversation.answers.get("Which region?").map(String::as_str),
            Some("Texas")
        );
    }

    #[test]
    fn test_duplicate_questions_tracked_once() {
        let cfg = config();
        let mut state = WorkflowState::new("t");
        record_question(&mut state, "Which region?", &cfg);
        record_question(&mut state, "Which region?", &cfg);
        assert_eq!(state.conversation.questions_asked.len(), 1);
        assert_eq!(state.conversation.turns.len(), 2);
    }

    #[test]
    fn test_corrections_need_both_values() {
        let cfg = config();
        let mut ctx = ConversationContext::default();
        let mut before = ExtractedInfo::default();
        before.set(Field::Geography, FieldValue::Value("Texas".into()));
        before.set(Field::Title, FieldValue::Value("owner".into()));
        let mut after = before.clone();
        after.set(Field::Geography, FieldValue::Value("Ohio".into()));
        after.set(Field::Title, FieldValue::Cleared);
        after.set(Field::Industry, FieldValue::Value("cleaning".into()));

        ctx.track_corrections(&before, &after, &cfg);
        assert_eq!(
            ctx.corrections,
            vec![Correction {
                field: Field::Geography,
                old_value: "Texas".into(),
                new_value: "Ohio".into(),
            }]
        );
    }

    #[test]
    fn test_update_intent_recorded() {
        let cfg = config();
        let mut state = WorkflowState::new("t");
        record_user_turn(&mut state, "Please CHANGE the region", &cfg);
        record_user_turn(&mut state, "thanks", &cfg);
        assert_eq!(state.conversation.update_requests, vec!["Please CHANGE the region"]);
    }

    #[test]
    fn test_pruning_is_fifo() {
        let mut cfg = config();
        cfg.max_conversation_turns = 3;
        cfg.conversation_history_limit = 2;
        let mut state = WorkflowState::new("t");
        for i in 0..4 {
            record_question(&mut state, &format!("Question {i}?"), &cfg);
            record_user_turn(&mut state, &format!("answer {i}"), &cfg);
        }
        let ctx = &state.conversation;
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.turns[2].content, "answer 3");
        assert_eq!(ctx.questions_asked, vec!["Question 2?", "Question 3?"]);
        assert!(ctx.answers.keys().all(|q| ctx.questions_asked.contains(q)));
        // The raw message log is not pruned
        assert_eq!(state.messages.len(), 8);
    }

    #[test]
    fn test_summary_and_text_rendering() {
        let cfg = config();
        let mut state = WorkflowState::new("t");
        assert_eq!(state.conversation.summary(&cfg), "No conversation history yet.");
        assert_eq!(
            state.conversation.conversation_text(10),
            "No previous conversation."
        );

        record_question(&mut state, "Which region?", &cfg);
        record_user_turn(&mut state, "Texas", &cfg);
        let summary = state.conversation.summary(&cfg);
        assert!(summary.contains("Q1: Which region?"));
        assert!(summary.contains("A1: Texas"));
        assert_eq!(
            state.conversation.conversation_text(10),
            "Assistant: Which region?\nUser: Texas"
        );
    }
}
