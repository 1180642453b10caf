//! Workflow Engine
//!
//! Drives one turn through the stage graph:
//!
//! ```text
//! RecordTurn -> Extract -+-> PrepareUpdate ------------------------------+
//!                        +-> CheckCompleteness -+-> Clarify --(ask)--> Suspend
//!                                               |      |
//!                                               |      +--(proceed)--+
//!                                               +--------------------+-> ResolveIndustry
//!   ResolveIndustry -> ResolveTitle -> SynthesizeSql -> ValidateSql -+-> Clarify (follow-up)
//!                                                                    +-> End
//! ```
//!
//! Stages run sequentially to completion. Domain, capability and validation
//! failures are written to the state and end the turn; only a runaway stage
//! loop surfaces as an error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::clarification::{eligibility, ClarifyMode, Clarifier};
use super::completeness::{missing_fields, required_missing};
use super::extraction::Extractor;
use super::fields::{Field, FieldValue};
use super::industry::{find_exclusion, industry_description, IndustryResolver, Resolution};
use super::memory::{record_question, record_user_turn};
use super::sql_synthesis::{consistency_warnings, SqlSynthesizer};
use super::state::{TitleCondition, WorkflowMode, WorkflowState};
use super::title_tier::TitleTierResolver;
use crate::agentic::LlmClient;
use crate::config::WorkflowConfig;
use crate::database::{SchemaIntrospector, StaticSchema};
use crate::error::WorkflowError;
use crate::sql::SqlSafetyValidator;

/// Upper bound on stage executions per turn
pub const MAX_STAGE_TRANSITIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RecordTurn,
    Extract,
    PrepareUpdate,
    CheckCompleteness,
    Clarify(ClarifyMode),
    ResolveIndustry,
    ResolveTitle,
    SynthesizeSql,
    ValidateSql,
    /// Awaiting a human answer; the turn ends here
    Suspend,
    End,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Suspend | Stage::End)
    }
}

/// Facts fixed at the start of a turn
#[derive(Debug, Clone, Copy)]
struct Turn {
    /// Validated SQL existed when the turn began
    is_update: bool,
}

/// Where to go once completeness has been evaluated
pub fn route_after_completeness(state: &WorkflowState, config: &WorkflowConfig) -> Stage {
    match eligibility(state, false, config) {
        Some(mode) => Stage::Clarify(mode),
        None => Stage::ResolveIndustry,
    }
}

/// Where to go once the safety validator has run
pub fn route_after_validation(state: &WorkflowState, config: &WorkflowConfig) -> Stage {
    if state.validated_sql().is_none() {
        return Stage::End;
    }
    match eligibility(state, true, config) {
        Some(mode) => Stage::Clarify(mode),
        None => Stage::End,
    }
}

/// The workflow engine
pub struct Engine {
    config: Arc<WorkflowConfig>,
    extractor: Extractor,
    clarifier: Clarifier,
    industry: IndustryResolver,
    titles: TitleTierResolver,
    synthesizer: SqlSynthesizer,
    validator: SqlSafetyValidator,
}

impl Engine {
    pub fn builder(client: Arc<dyn LlmClient>) -> EngineBuilder {
        EngineBuilder::new(client)
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Number of industry mappings held in the shared cache
    pub fn cached_industries(&self) -> usize {
        self.industry.cached()
    }

    /// Run one user turn against `state`
    pub async fn run_turn(
        &self,
        state: &mut WorkflowState,
        utterance: &str,
    ) -> Result<(), WorkflowError> {
        let turn = Turn {
            is_update: state.validated_sql().is_some(),
        };
        info!(
            thread_id = %state.thread_id,
            is_update = turn.is_update,
            "Processing turn"
        );

        let mut stage = Stage::RecordTurn;
        let mut steps = 0;
        while !stage.is_terminal() {
            steps += 1;
            if steps > MAX_STAGE_TRANSITIONS {
                warn!(thread_id = %state.thread_id, ?stage, "Stage limit exceeded");
                return Err(WorkflowError::StageLimitExceeded(MAX_STAGE_TRANSITIONS));
            }
            debug!(thread_id = %state.thread_id, ?stage, "Entering stage");
            stage = self.step(stage, turn, state, utterance).await;
        }

        state.updated_at = chrono::Utc::now();
        info!(
            thread_id = %state.thread_id,
            ended = ?stage,
            mode = ?state.mode,
            sql_valid = ?state.sql_valid,
            "Turn finished"
        );
        Ok(())
    }

    async fn step(
        &self,
        stage: Stage,
        turn: Turn,
        state: &mut WorkflowState,
        utterance: &str,
    ) -> Stage {
        let config = self.config.as_ref();
        match stage {
            Stage::RecordTurn => {
                state.needs_human_input = false;
                state.pending_question = None;
                record_user_turn(state, utterance, config);
                Stage::Extract
            }
            Stage::Extract => {
                if turn.is_update {
                    state.transition_to(WorkflowMode::Updating);
                } else {
                    state.transition_to(WorkflowMode::Extracting);
                }
                self.extractor
                    .run(state, utterance, turn.is_update, config)
                    .await;
                if turn.is_update {
                    Stage::PrepareUpdate
                } else {
                    Stage::CheckCompleteness
                }
            }
            Stage::PrepareUpdate => {
                info!("Update request: regenerating SQL from modified fields");
                state.clear_sql();
                state.missing_fields = missing_fields(&state.extracted, true);
                Stage::ResolveIndustry
            }
            Stage::CheckCompleteness => {
                state.missing_fields = missing_fields(&state.extracted, false);
                route_after_completeness(state, config)
            }
            Stage::Clarify(mode) => self.clarify(mode, state).await,
            Stage::ResolveIndustry => self.resolve_industry(turn, state).await,
            Stage::ResolveTitle => {
                self.resolve_title(turn, state);
                Stage::SynthesizeSql
            }
            Stage::SynthesizeSql => match self.synthesizer.synthesize(state, config).await {
                Ok(sql) => {
                    state.sql_warnings = consistency_warnings(&sql, state);
                    state.sql_query = Some(sql);
                    state.sql_valid = None;
                    state.sql_error = None;
                    Stage::ValidateSql
                }
                Err(e) => {
                    warn!("SQL synthesis failed: {}", e);
                    state.fail(e.to_string());
                    Stage::End
                }
            },
            Stage::ValidateSql => {
                let Some(sql) = state.sql_query.clone() else {
                    state.fail("No SQL query to validate");
                    return Stage::End;
                };
                match self.validator.validate(&sql) {
                    Ok(()) => {
                        state.sql_valid = Some(true);
                        state.sql_error = None;
                        state.transition_to(WorkflowMode::Complete);
                        route_after_validation(state, config)
                    }
                    Err(reason) => {
                        state.fail(reason.to_string());
                        Stage::End
                    }
                }
            }
            Stage::Suspend | Stage::End => stage,
        }
    }

    async fn clarify(&self, mode: ClarifyMode, state: &mut WorkflowState) -> Stage {
        let config = self.config.as_ref();
        match self.clarifier.decide(state, mode, config).await {
            Ok(Some(question)) => {
                record_question(state, &question, config);
                state.needs_human_input = true;
                state.pending_question = Some(question);
                if mode.counts_against_cap() {
                    state.contextual_questions_asked += 1;
                }
                state.transition_to(WorkflowMode::Clarifying);
                Stage::Suspend
            }
            Ok(None) if mode == ClarifyMode::FollowUp => Stage::End,
            Ok(None) => {
                let required = required_missing(&state.missing_fields);
                if required.is_empty() {
                    return Stage::ResolveIndustry;
                }
                let names: Vec<&str> = required.iter().map(Field::as_str).collect();
                warn!(?required, "Proceeding impossible without required fields");
                state.fail(format!("Missing required information: {}", names.join(", ")));
                Stage::End
            }
            Err(e) if mode == ClarifyMode::FollowUp => {
                warn!("Follow-up clarification failed, keeping validated SQL: {:#}", e);
                Stage::End
            }
            Err(e) => {
                warn!("Clarification failed: {:#}", e);
                state.fail(format!("Clarification failed: {:#}", e));
                Stage::End
            }
        }
    }

    async fn resolve_industry(&self, turn: Turn, state: &mut WorkflowState) -> Stage {
        state.transition_to(WorkflowMode::Generating);

        let Some(industry) = state.extracted.value(Field::Industry).map(str::to_string) else {
            if state.sic_context.take().is_some() {
                debug!("Industry no longer set; dropping resolved codes");
            }
            return Stage::ResolveTitle;
        };
        let target = state
            .extracted
            .value(Field::TargetCustomerType)
            .map(str::to_string);
        let description = industry_description(&industry, target.as_deref());

        if let Some(existing) = &state.sic_context {
            let untouched = turn.is_update && !state.mentioned_fields.contains(&Field::Industry);
            if untouched || existing.industry_input.eq_ignore_ascii_case(&description) {
                info!("Industry unchanged; keeping {} resolved codes", existing.codes.len());
                return Stage::ResolveTitle;
            }
        }

        let exclusion = find_exclusion(&state.conversation, self.config.exclusion_check_turns);
        match self
            .industry
            .resolve(&industry, target.as_deref(), exclusion.as_deref())
            .await
        {
            Ok(Resolution::Resolved(context)) => {
                state.sic_context = Some(context);
                Stage::ResolveTitle
            }
            Ok(Resolution::NotFound { industry, rationale }) => {
                state.sic_context = None;
                state.fail(Resolution::not_found_message(&industry, &rationale));
                Stage::End
            }
            Err(e) => {
                warn!("Industry code mapping failed: {:#}", e);
                state.fail(format!("Industry code mapping failed: {:#}", e));
                Stage::End
            }
        }
    }

    fn resolve_title(&self, turn: Turn, state: &mut WorkflowState) {
        let title = match &state.extracted.title {
            FieldValue::Value(title) => title.clone(),
            _ => {
                state.title_condition = None;
                return;
            }
        };

        if let Some(existing) = &state.title_condition {
            let untouched = turn.is_update && !state.mentioned_fields.contains(&Field::Title);
            if untouched || existing.title_input == title {
                debug!("Title unchanged; keeping {}", existing.predicate);
                return;
            }
        }

        state.title_condition = self.titles.condition(&title).map(|predicate| TitleCondition {
            title_input: title,
            predicate,
        });
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    client: Arc<dyn LlmClient>,
    config: Option<WorkflowConfig>,
    schema: Option<Arc<dyn SchemaIntrospector>>,
}

impl EngineBuilder {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            config: None,
            schema: None,
        }
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Schema source for synthesis prompts (default: the built-in table layout)
    pub fn schema(mut self, schema: Arc<dyn SchemaIntrospector>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config.unwrap_or_default();
        let schema = self
            .schema
            .unwrap_or_else(|| Arc::new(StaticSchema::icp_data()));
        info!(
            model = self.client.model_name(),
            provider = self.client.provider_name(),
            table = %config.table_name,
            "Building workflow engine"
        );
        Engine {
            extractor: Extractor::new(self.client.clone()),
            clarifier: Clarifier::new(self.client.clone()),
            industry: IndustryResolver::new(
                self.client.clone(),
                config.industry_cache_capacity,
                config.max_industry_codes,
            ),
            titles: TitleTierResolver::new(&config.title_tiers),
            synthesizer: SqlSynthesizer::new(self.client, schema),
            validator: SqlSafetyValidator::new(),
            config: Arc::new(config),
        }
    }
}
