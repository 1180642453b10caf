//! Workflow configuration
//!
//! `WorkflowConfig` is loaded from YAML (every key optional). LLM backend
//! selection comes from the environment via `LlmSettings`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agentic::{build_client, AgentBackend, LlmClient};
use crate::error::ConfigError;

/// Environment variable naming an alternative config file
pub const CONFIG_ENV_VAR: &str = "ICP_CONFIG";

/// Config file used when `ICP_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/workflow.yaml";

/// Tunables for the conversational workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Turns kept in the conversation log
    pub max_conversation_turns: usize,
    /// Turns rendered into prompts, and the bound on tracked questions
    pub conversation_history_limit: usize,
    pub max_questions_to_show: usize,
    pub max_corrections_to_keep: usize,
    pub max_updates_to_keep: usize,
    pub text_truncate_length: usize,
    pub question_truncate_length: usize,
    /// Contextual (non missing-field) questions allowed per session
    pub max_contextual_questions: usize,
    pub min_question_length: usize,
    /// Recent user turns scanned for exclusion phrases
    pub exclusion_check_turns: usize,
    pub table_name: String,
    pub db_type: String,
    pub max_result_rows: usize,
    pub industry_cache_capacity: usize,
    pub max_industry_codes: usize,
    pub title_tiers: TitleTierConfig,
}

/// Keyword lists for the three title tiers, highest priority first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleTierConfig {
    pub tier_i: Vec<String>,
    pub tier_ii: Vec<String>,
    pub tier_iii: Vec<String>,
}

impl Default for TitleTierConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            tier_i: words(&[
                "owner",
                "founder",
                "ceo",
                "president",
                "principal",
                "partner",
                "chief",
                "managing director",
            ]),
            tier_ii: words(&["director", "vp", "vice president", "head"]),
            tier_iii: words(&["manager", "supervisor", "coordinator", "specialist"]),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_conversation_turns: 15,
            conversation_history_limit: 10,
            max_questions_to_show: 5,
            max_corrections_to_keep: 5,
            max_updates_to_keep: 5,
            text_truncate_length: 100,
            question_truncate_length: 50,
            max_contextual_questions: 1,
            min_question_length: 10,
            exclusion_check_turns: 5,
            table_name: "icp_data".to_string(),
            db_type: "postgresql".to_string(),
            max_result_rows: 5,
            industry_cache_capacity: 512,
            max_industry_codes: 50,
            title_tiers: TitleTierConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Load from `ICP_CONFIG`, else `config/workflow.yaml`, else defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from_file(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_file(default_path);
        }
        debug!("No workflow config file found, using defaults");
        Ok(Self::default())
    }

    /// Load from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::load_from_str(&content)?;
        info!("Loaded workflow config from {}", path.display());
        Ok(config)
    }

    /// Load from a YAML string
    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        for tier in [
            &mut self.title_tiers.tier_i,
            &mut self.title_tiers.tier_ii,
            &mut self.title_tiers.tier_iii,
        ] {
            for keyword in tier.iter_mut() {
                *keyword = keyword.trim().to_lowercase();
            }
            tier.retain(|k| !k.is_empty());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_ident = !self.table_name.is_empty()
            && self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid_ident {
            return Err(ConfigError::Invalid(format!(
                "table_name '{}' is not a plain identifier",
                self.table_name
            )));
        }
        for (name, value) in [
            ("max_conversation_turns", self.max_conversation_turns),
            ("conversation_history_limit", self.conversation_history_limit),
            ("industry_cache_capacity", self.industry_cache_capacity),
            ("max_industry_codes", self.max_industry_codes),
            ("max_result_rows", self.max_result_rows),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

/// LLM backend selection read from the environment
#[derive(Clone)]
pub struct LlmSettings {
    pub backend: AgentBackend,
    pub api_key: String,
    /// Model override (`ANTHROPIC_MODEL` / `OPENAI_MODEL`)
    pub model: Option<String>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("backend", &self.backend)
            .field("api_key", &"***")
            .field("model", &self.model)
            .finish()
    }
}

impl LlmSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = AgentBackend::from_env()?;
        let api_key = std::env::var(backend.api_key_var())
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", backend.api_key_var()))?;
        Ok(Self {
            backend,
            api_key,
            model: std::env::var(backend.model_var()).ok().filter(|m| !m.is_empty()),
        })
    }

    /// Build the configured client
    pub fn client(&self) -> Arc<dyn LlmClient> {
        build_client(self.backend, self.api_key.clone(), self.model.as_deref())
    }
}
