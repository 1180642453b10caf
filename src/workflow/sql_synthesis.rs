//! SQL synthesis
//!
//! Builds the generation prompt from the table schema and the resolved
//! filters, asks the model for one statement and strips code fences. The
//! result is not trusted: the engine always passes it through the safety
//! validator.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::fields::{split_values, Field};
use super::state::WorkflowState;
use crate::agentic::{strip_code_blocks, LlmClient};
use crate::config::WorkflowConfig;
use crate::database::SchemaIntrospector;

const SYSTEM_PROMPT: &str = include_str!("../prompts/sql_generation.md");

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Unable to retrieve database schema: {0}")]
    Schema(String),

    #[error("SQL generation failed: {0}")]
    Capability(String),

    #[error("SQL generation returned an empty query")]
    Empty,
}

pub struct SqlSynthesizer {
    client: Arc<dyn LlmClient>,
    schema: Arc<dyn SchemaIntrospector>,
}

impl SqlSynthesizer {
    pub fn new(client: Arc<dyn LlmClient>, schema: Arc<dyn SchemaIntrospector>) -> Self {
        Self { client, schema }
    }

    pub async fn synthesize(
        &self,
        state: &WorkflowState,
        config: &WorkflowConfig,
    ) -> Result<String, SynthesisError> {
        let schema = self
            .schema
            .describe(&config.table_name)
            .await
            .map_err(|e| SynthesisError::Schema(e.to_string()))?;

        let prompt = build_prompt(state, &schema, config);
        let system = SYSTEM_PROMPT.replace("{table_name}", &config.table_name);

        let response = self
            .client
            .chat(&system, &prompt)
            .await
            .map_err(|e| SynthesisError::Capability(format!("{:#}", e)))?;

        let sql = strip_code_blocks(&response);
        if sql.is_empty() {
            return Err(SynthesisError::Empty);
        }
        info!("Generated SQL query: {}", sql);
        Ok(sql)
    }
}

fn omit(field: Field) -> String {
    match field.column() {
        Some(column) => format!(
            "Not specified (OMIT this filter - do not include {} condition)",
            column
        ),
        None => "Not specified".to_string(),
    }
}

fn sql_literal(text: &str) -> String {
    text.replace('\'', "''")
}

fn geography_instruction(value: &str) -> String {
    let locations = split_values(value);
    if locations.len() <= 1 {
        return value.to_string();
    }
    let fragments: Vec<String> = locations
        .iter()
        .map(|loc| format!("LOWER(geography) LIKE LOWER('%{}%')", sql_literal(loc)))
        .collect();
    format!(
        "Multiple locations: {} (use OR conditions: {})",
        locations.join(", "),
        fragments.join(" OR ")
    )
}

fn industry_instruction(state: &WorkflowState) -> String {
    let Some(industry) = state.extracted.value(Field::Industry) else {
        return omit(Field::Industry);
    };
    let Some(sic) = state.sic_context.as_ref().filter(|s| !s.codes.is_empty()) else {
        return omit(Field::Industry);
    };

    let parts = split_values(industry);
    let label = if parts.len() > 1 {
        format!(
            "Multiple industries: {} (codes already combined)",
            parts.join(", ")
        )
    } else {
        industry.to_string()
    };
    format!(
        "{} - REQUIRED SQL condition: {}\nCode reasoning: {}",
        label,
        sic.sql_condition(),
        sic.rationale
    )
}

fn title_instruction(state: &WorkflowState) -> String {
    let Some(title) = state.extracted.value(Field::Title) else {
        return omit(Field::Title);
    };
    if let Some(condition) = &state.title_condition {
        return format!("{} (REQUIRED SQL condition: {})", title, condition.predicate);
    }
    let titles = split_values(title);
    if titles.len() > 1 {
        format!(
            "Multiple titles: {} (classify each into tier_i, tier_ii or tier_iii and combine with OR)",
            titles.join(", ")
        )
    } else {
        format!("{} (classify into tier_i, tier_ii, or tier_iii)", title)
    }
}

fn build_prompt(state: &WorkflowState, schema: &str, config: &WorkflowConfig) -> String {
    let info = &state.extracted;
    let plain = |field: Field| {
        info.value(field)
            .map(str::to_string)
            .unwrap_or_else(|| omit(field))
    };
    let geography = info
        .value(Field::Geography)
        .map(geography_instruction)
        .unwrap_or_else(|| omit(Field::Geography));
    let target = info
        .value(Field::TargetCustomerType)
        .map(|t| format!("{} (already reflected in the industry codes; no separate column)", t))
        .unwrap_or_else(|| omit(Field::TargetCustomerType));

    let mut prompt = String::new();

    let conversation = state
        .conversation
        .conversation_text(config.conversation_history_limit);
    prompt.push_str(&format!("Conversation context:\n{}\n\n", conversation));

    if !config.db_type.eq_ignore_ascii_case("postgresql") {
        prompt.push_str(&format!(
            "Database Type: {}\nUse standard SQL syntax compatible with {}.\n\n",
            config.db_type.to_uppercase(),
            config.db_type
        ));
    }

    prompt.push_str(&format!("Table schema:\n{}\n\n", schema));
    prompt.push_str("Filters:\n");
    prompt.push_str(&format!("- Geography: {}\n", geography));
    prompt.push_str(&format!("- Industry: {}\n", industry_instruction(state)));
    prompt.push_str(&format!("- Target customer type: {}\n", target));
    prompt.push_str(&format!("- Title: {}\n", title_instruction(state)));
    prompt.push_str(&format!("- Employee size: {}\n", plain(Field::EmployeeSize)));
    prompt.push_str(&format!("- Square footage: {}\n", plain(Field::SquareFootage)));
    prompt.push_str(&format!("- Sales volume: {}\n", plain(Field::SalesVolume)));
    prompt
}

/// Structural mismatches between `sql` and the resolved filters
pub fn consistency_warnings(sql: &str, state: &WorkflowState) -> Vec<String> {
    let lower = sql.to_lowercase();
    let mut warnings = Vec::new();

    if state
        .sic_context
        .as_ref()
        .is_some_and(|s| !s.codes.is_empty())
        && state.extracted.industry.is_set()
        && !lower.contains("industry")
    {
        warnings.push("Industry codes were resolved but the SQL has no industry filter".to_string());
    }

    if state.title_condition.is_some()
        && state.extracted.title.is_set()
        && !lower.contains("title_tier")
    {
        warnings.push("Title tier was resolved but the SQL has no title_tier filter".to_string());
    }

    if let Some(pos) = lower.find("where") {
        let filters = &lower[pos..];
        for field in Field::ALL {
            if state.extracted.get(field).is_set() {
                continue;
            }
            if let Some(column) = field.column() {
                if filters.contains(column) {
                    warnings.push(format!(
                        "{} was not specified but the SQL filters on {}",
                        field, column
                    ));
                }
            }
        }
    }

    for w in &warnings {
        warn!("{}", w);
    }
    warnings
}
