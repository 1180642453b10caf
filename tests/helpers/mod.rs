//! Shared fixtures for the conversation tests
//!
//! Every model call is answered by `ScriptedClient`, so the tests run without
//! network or database access.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Map, Value};

use icp_agentic::ScriptedClient;
use icp_query::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use icp_query::config::WorkflowConfig;
use icp_query::workflow::clarification::CLARIFY_TOOL;
use icp_query::workflow::{Engine, QueryAssistant};

/// Extraction arguments: the listed fields are mentioned, all others are not
pub fn extraction(fields: &[(&str, Option<&str>)]) -> Value {
    let mut args = Map::new();
    for (field, value) in fields {
        args.insert(field.to_string(), json!(value));
        args.insert(format!("{}_mentioned", field), json!(true));
    }
    Value::Object(args)
}

pub fn ask(question: &str) -> Value {
    json!({ "needs_clarification": true, "question": question })
}

pub fn proceed() -> Value {
    json!({ "needs_clarification": false, "question": null })
}

pub fn codes(codes: &[&str], rationale: &str) -> Value {
    json!({ "codes": codes, "rationale": rationale })
}

/// Client that never asks a clarifying question unless one is queued
pub fn scripted() -> Arc<ScriptedClient> {
    let client = ScriptedClient::new();
    client.set_tool_default(CLARIFY_TOOL, proceed());
    Arc::new(client)
}

pub fn assistant(client: Arc<ScriptedClient>) -> QueryAssistant {
    assistant_with_store(client, Arc::new(InMemoryCheckpointStore::new()))
}

pub fn assistant_with_store(
    client: Arc<ScriptedClient>,
    store: Arc<dyn CheckpointStore>,
) -> QueryAssistant {
    let engine = Engine::builder(client)
        .config(WorkflowConfig::default())
        .build();
    QueryAssistant::new(engine, store)
}

pub const CLEANING_SQL: &str = "SELECT * FROM icp_data WHERE LOWER(geography) LIKE LOWER('%Texas%') AND industry IN ('8062', '6512', '8211') AND title_tier = 'tier_i' AND employee_size >= 50 AND square_footage >= 10000";

pub const CLEANING_SQL_NY: &str = "SELECT * FROM icp_data WHERE (LOWER(geography) LIKE LOWER('%Texas%') OR LOWER(geography) LIKE LOWER('%New York%')) AND industry IN ('8062', '6512', '8211') AND title_tier = 'tier_i' AND employee_size >= 50 AND square_footage >= 10000";
