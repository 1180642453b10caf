//! Extraction stage
//!
//! Asks the model for one optional value and one "mentioned" flag per field,
//! then folds the result into `ExtractedInfo`:
//!
//! - new request: mentioned fields overwrite (an empty value clears), an
//!   unmentioned field with a value is taken as a first mention, the rest are
//!   kept;
//! - update request: only mentioned fields change, everything else is copied
//!   from the prior record even when the model proposed a value.
//!
//! A failed capability call degrades to the empty extraction, which leaves
//! the prior record untouched.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::fields::{split_values, ExtractedInfo, Field, FieldValue};
use super::state::{ExtractionRecord, WorkflowState};
use crate::agentic::{invoke_structured, LlmClient, ToolDefinition};
use crate::config::WorkflowConfig;

const SYSTEM_PROMPT: &str = include_str!("../prompts/extraction.md");

pub const EXTRACT_TOOL: &str = "extract_icp_fields";

/// Structured output of the extraction call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExtraction {
    pub geography: Option<String>,
    pub industry: Option<String>,
    pub target_customer_type: Option<String>,
    pub title: Option<String>,
    pub employee_size: Option<String>,
    pub square_footage: Option<String>,
    pub sales_volume: Option<String>,
    pub geography_mentioned: bool,
    pub industry_mentioned: bool,
    pub target_customer_type_mentioned: bool,
    pub title_mentioned: bool,
    pub employee_size_mentioned: bool,
    pub square_footage_mentioned: bool,
    pub sales_volume_mentioned: bool,
}

impl RawExtraction {
    pub fn value(&self, field: Field) -> Option<&str> {
        match field {
            Field::Geography => self.geography.as_deref(),
            Field::Industry => self.industry.as_deref(),
            Field::TargetCustomerType => self.target_customer_type.as_deref(),
            Field::Title => self.title.as_deref(),
            Field::EmployeeSize => self.employee_size.as_deref(),
            Field::SquareFootage => self.square_footage.as_deref(),
            Field::SalesVolume => self.sales_volume.as_deref(),
        }
    }

    pub fn mentioned(&self, field: Field) -> bool {
        match field {
            Field::Geography => self.geography_mentioned,
            Field::Industry => self.industry_mentioned,
            Field::TargetCustomerType => self.target_customer_type_mentioned,
            Field::Title => self.title_mentioned,
            Field::EmployeeSize => self.employee_size_mentioned,
            Field::SquareFootage => self.square_footage_mentioned,
            Field::SalesVolume => self.sales_volume_mentioned,
        }
    }
}

fn field_description(field: Field) -> &'static str {
    match field {
        Field::Geography => "Location (state or city) where clients are located. Comma-separated for several locations, e.g. 'Texas, Arizona'. Extract ALL locations mentioned.",
        Field::Industry => "What the user sells (service/product). Comma-separated for several, e.g. 'restaurants, hotels'. Extract ALL industries mentioned.",
        Field::TargetCustomerType => "Qualifier about who buys, e.g. 'startups' in 'to startups' or 'small businesses' in 'for small businesses'. Only if explicitly mentioned; not the industry itself.",
        Field::Title => "Decision maker role/title. Comma-separated for several, e.g. 'owner, CEO'. Extract ALL titles mentioned.",
        Field::EmployeeSize => "Company size: a number (e.g. '50') or bucket keyword: 'micro'/'small' (1-20), 'small-medium'/'medium' (21-200), 'enterprise'/'large' (200+).",
        Field::SquareFootage => "Property size, only for industries such as commercial cleaning, builders, pest control. Buckets: 'small' (<5,000), 'medium' (5,000-20,000), 'large' (20,000+).",
        Field::SalesVolume => "Sales volume/revenue as given, e.g. '50M', 'below 50M', 'between 10M and 50M'. Preserve the user's format.",
    }
}

/// JSON schema for `extract_icp_fields`
pub fn extraction_tool() -> ToolDefinition {
    let mut properties = serde_json::Map::new();
    for field in Field::ALL {
        properties.insert(
            field.as_str().to_string(),
            serde_json::json!({
                "type": ["string", "null"],
                "description": field_description(field)
            }),
        );
        properties.insert(
            format!("{}_mentioned", field.as_str()),
            serde_json::json!({
                "type": "boolean",
                "description": format!(
                    "True if {} is explicitly addressed in the user's CURRENT input (a value, or a request for no filter)",
                    field.as_str()
                )
            }),
        );
    }
    ToolDefinition::new(
        EXTRACT_TOOL,
        "Record the ICP filter fields found in the user's latest message",
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": Field::ALL.iter().map(|f| format!("{}_mentioned", f.as_str())).collect::<Vec<_>>()
        }),
    )
}

/// Extraction stage handle
pub struct Extractor {
    client: Arc<dyn LlmClient>,
    tool: ToolDefinition,
}

impl Extractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            tool: extraction_tool(),
        }
    }

    /// Run extraction for `utterance` and apply it to `state`
    pub async fn run(
        &self,
        state: &mut WorkflowState,
        utterance: &str,
        is_update: bool,
        config: &WorkflowConfig,
    ) {
        info!(is_update, "Extracting fields from user input");
        let prompt = build_prompt(state, utterance, is_update, config);

        let raw = match invoke_structured::<RawExtraction>(
            self.client.as_ref(),
            SYSTEM_PROMPT,
            &prompt,
            &self.tool,
        )
        .await
        {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Error during information extraction: {:#}", e);
                None
            }
        };

        state.extraction_history.push(ExtractionRecord {
            input: utterance.to_string(),
            raw: raw.as_ref().and_then(|r| serde_json::to_value(r).ok()),
            is_update,
            at: Utc::now(),
        });
        let overflow = state
            .extraction_history
            .len()
            .saturating_sub(config.max_conversation_turns);
        state.extraction_history.drain(..overflow);

        let raw = raw.unwrap_or_default();
        let prior = state.extracted.clone();
        let (next, mentioned) = apply_extraction(&prior, &raw, is_update, utterance);

        state.conversation.track_corrections(&prior, &next, config);
        state.extracted = next;
        state.mentioned_fields = mentioned;
        info!(
            extracted = %state.extracted.to_json(),
            mentioned = ?state.mentioned_fields,
            "Extracted information"
        );
    }
}

/// Fold a raw extraction into the prior record
pub fn apply_extraction(
    prior: &ExtractedInfo,
    raw: &RawExtraction,
    is_update: bool,
    utterance: &str,
) -> (ExtractedInfo, BTreeSet<Field>) {
    let mut next = prior.clone();
    let mut mentioned = BTreeSet::new();

    for field in Field::ALL {
        if raw.mentioned(field) {
            next.set(field, FieldValue::mentioned(raw.value(field)));
            mentioned.insert(field);
        } else if !is_update {
            if let FieldValue::Value(v) = FieldValue::mentioned(raw.value(field)) {
                next.set(field, FieldValue::Value(v));
                mentioned.insert(field);
            }
        } else if raw.value(field).is_some() {
            debug!("Preserving unmentioned field '{}' in update", field);
        }
    }

    if is_update {
        apply_append_safeguard(prior, &mut next, &mentioned, utterance);
    }

    (next, mentioned)
}

fn append_indicator() -> &'static Option<Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(also|too|both|include|including|add|plus|as well)\b").ok())
}

fn replace_indicator() -> &'static Option<Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(change|replace|instead|switch|only|rather than)\b").ok()
    })
}

fn matches(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Merge `previous, new` for multi-valued fields the user appended to
fn apply_append_safeguard(
    prior: &ExtractedInfo,
    next: &mut ExtractedInfo,
    mentioned: &BTreeSet<Field>,
    utterance: &str,
) {
    if !matches(append_indicator(), utterance) || matches(replace_indicator(), utterance) {
        return;
    }

    for field in mentioned.iter().copied().filter(Field::is_multi_valued) {
        let (Some(old), Some(new)) = (prior.value(field), next.value(field)) else {
            continue;
        };
        let new_parts = split_values(new);
        let old_parts = split_values(old);
        let contains = |parts: &[&str], v: &str| parts.iter().any(|p| p.eq_ignore_ascii_case(v));

        if old_parts.iter().all(|o| contains(&new_parts, o)) {
            continue;
        }

        let mut merged: Vec<&str> = Vec::new();
        for part in old_parts.iter().chain(new_parts.iter()) {
            if !contains(&merged, part) {
                merged.push(part);
            }
        }
        let merged = merged.join(", ");
        info!("Appending to {}: '{}' + '{}' -> '{}'", field, old, new, merged);
        next.set(field, FieldValue::Value(merged));
    }
}

fn build_prompt(
    state: &WorkflowState,
    utterance: &str,
    is_update: bool,
    config: &WorkflowConfig,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if is_update {
        parts.push("CRITICAL: This is an UPDATE request. The user wants to modify an existing SQL query.".into());
        parts.push("ONLY extract fields that are EXPLICITLY mentioned in the user's current response.".into());
        parts.push("For fields NOT mentioned, return null and set the mentioned flag to false - DO NOT infer values from context.".into());
    }

    let conversation = state
        .conversation
        .conversation_text(config.conversation_history_limit);
    // The current utterance is already the last turn of the log
    parts.push(format!("Conversation history:\n{}", conversation));

    let summary = state.conversation.summary(config);
    if !state.conversation.questions_asked.is_empty()
        || !state.conversation.corrections.is_empty()
        || !state.conversation.update_requests.is_empty()
    {
        parts.push(format!("Conversation summary:\n{}", summary));
    }

    if let Some(existing) = state.extracted.describe() {
        if is_update {
            parts.push(format!("Current SQL query parameters: {}", existing));
            parts.push("IMPORTANT: If the user wants to ADD/APPEND to existing values (phrases like 'too', 'also', 'both', 'include', 'add'), extract ALL values including existing ones. If the user wants to REPLACE (no append indicators), extract only the new value.".into());
            parts.push("Only update fields that are EXPLICITLY mentioned in the user's update request.".into());
        } else {
            parts.push(format!("Previously extracted information: {}", existing));
        }
    }

    let mut prompt = format!(
        "{}\n\nUser's CURRENT input (extract ONLY from this): {}",
        parts.join("\n"),
        utterance
    );
    if is_update {
        prompt.push_str("\n\nREMINDER: This is an UPDATE request. ONLY extract fields EXPLICITLY mentioned in the user's CURRENT input above. For any field NOT mentioned, return null.");
    }
    prompt
}
