//! Industry resolver
//!
//! Maps what the user sells to 4-digit classification codes of the companies
//! that *buy* it. Successful mappings are cached process-wide in a bounded
//! LRU keyed by the normalized description and any exclusion context.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::cache::LruCache;
use super::fields::split_values;
use super::memory::ConversationContext;
use super::state::SicContext;
use crate::agentic::{invoke_structured, LlmClient, ToolDefinition};

const SYSTEM_PROMPT: &str = include_str!("../prompts/industry.md");

pub const INDUSTRY_TOOL: &str = "map_industry_codes";

pub const DEFAULT_NOT_FOUND_RATIONALE: &str =
    "The provided industry description is not a valid or recognizable industry.";

/// Outcome of a resolution that reached the model (or the cache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(SicContext),
    /// No valid code survived validation
    NotFound { industry: String, rationale: String },
}

impl Resolution {
    /// User-facing text for a `NotFound`
    pub fn not_found_message(industry: &str, rationale: &str) -> String {
        format!(
            "We don't have data regarding the industry '{}'. {}",
            industry, rationale
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(default)]
    codes: Vec<serde_json::Value>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedMapping {
    codes: Vec<String>,
    rationale: String,
}

/// `"<industry> for <target customer type>"`, or the industry alone
pub fn industry_description(industry: &str, target_customer_type: Option<&str>) -> String {
    match target_customer_type {
        Some(target) => format!("{} for {}", industry.trim(), target.trim()),
        None => industry.trim().to_string(),
    }
}

/// Keep codes that are exactly 4 digits (after stripping non-digits) in
/// 0000-8999, deduplicated, at most `max`
pub fn validate_codes<'a>(raw: impl IntoIterator<Item = &'a str>, max: usize) -> Vec<String> {
    let mut valid: Vec<String> = Vec::new();
    for code in raw {
        let digits: String = code.chars().filter(char::is_ascii_digit).collect();
        let in_range = digits.len() == 4 && digits.parse::<u32>().is_ok_and(|n| n <= 8999);
        if !in_range {
            debug!("Dropping invalid classification code '{}'", code);
            continue;
        }
        if !valid.contains(&digits) {
            valid.push(digits);
        }
        if valid.len() == max {
            break;
        }
    }
    valid
}

fn exclusion_regex() -> &'static Option<Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(exclude|excluding|filter out|without|avoid|remove|not|don['’]?t want|don['’]?t need)\b",
        )
        .ok()
    })
}

/// Most recent user turn (within the last `turns`) that asks to exclude something
pub fn find_exclusion(conversation: &ConversationContext, turns: usize) -> Option<String> {
    let re = exclusion_regex().as_ref()?;
    conversation
        .recent_user_turns(turns)
        .find(|content| re.is_match(content))
        .map(str::to_string)
}

pub fn industry_tool() -> ToolDefinition {
    ToolDefinition::new(
        INDUSTRY_TOOL,
        "Map a product/service description to classification codes of its primary buyers",
        serde_json::json!({
            "type": "object",
            "properties": {
                "industry": {
                    "type": "string",
                    "description": "Industry description provided by the user"
                },
                "codes": {
                    "type": "array",
                    "items": {"type": "string"},
                    "maxItems": 50,
                    "description": "4-digit codes (0000-8999) of PRIMARY BUYERS, the companies that purchase the service/product, not those that provide it. Empty if the description is not a real industry. Only genuinely relevant codes."
                },
                "rationale": {
                    "type": "string",
                    "description": "Category description followed by each code and its official description. If codes is empty, explain why the industry is not valid."
                }
            },
            "required": ["industry", "codes", "rationale"]
        }),
    )
}

pub struct IndustryResolver {
    client: Arc<dyn LlmClient>,
    tool: ToolDefinition,
    cache: LruCache<String, CachedMapping>,
    max_codes: usize,
}

impl IndustryResolver {
    pub fn new(client: Arc<dyn LlmClient>, cache_capacity: usize, max_codes: usize) -> Self {
        Self {
            client,
            tool: industry_tool(),
            cache: LruCache::new(cache_capacity),
            max_codes,
        }
    }

    /// Number of cached mappings
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a (possibly comma-delimited) industry
    ///
    /// Sub-industries are resolved independently; their codes are unioned
    /// and their rationales concatenated. `Err` is a capability failure.
    pub async fn resolve(
        &self,
        industry: &str,
        target_customer_type: Option<&str>,
        exclusion: Option<&str>,
    ) -> anyhow::Result<Resolution> {
        let parts = split_values(industry);
        let description = industry_description(industry, target_customer_type);
        if parts.len() <= 1 {
            return self.resolve_one(&description, exclusion).await;
        }

        let mut codes: Vec<String> = Vec::new();
        let mut rationales = Vec::new();
        let mut not_found = Vec::new();
        for part in parts {
            let part_description = industry_description(part, target_customer_type);
            match self.resolve_one(&part_description, exclusion).await? {
                Resolution::Resolved(ctx) => {
                    rationales.push(format!("{}: {}", part_description, ctx.rationale));
                    codes.extend(ctx.codes);
                }
                Resolution::NotFound { industry, rationale } => {
                    warn!("No codes for sub-industry '{}'", industry);
                    not_found.push(format!("{}: {}", industry, rationale));
                }
            }
        }

        let codes = validate_codes(codes.iter().map(String::as_str), self.max_codes);
        if codes.is_empty() {
            return Ok(Resolution::NotFound {
                industry: description,
                rationale: not_found.join(" "),
            });
        }
        info!("Mapped {} industries to {} codes", rationales.len(), codes.len());
        Ok(Resolution::Resolved(SicContext {
            industry_input: description,
            codes,
            rationale: format!("Multiple industries mapped:\n{}", rationales.join("\n\n")),
        }))
    }

    async fn resolve_one(
        &self,
        description: &str,
        exclusion: Option<&str>,
    ) -> anyhow::Result<Resolution> {
        let normalized = description.trim().to_lowercase();
        let cache_key = match exclusion {
            Some(excl) => format!("{}::exclude::{}", normalized, excl.trim().to_lowercase()),
            None => normalized,
        };

        if let Some(hit) = self.cache.get(&cache_key) {
            debug!("Returning cached codes for '{}'", description);
            return Ok(Resolution::Resolved(SicContext {
                industry_input: description.to_string(),
                codes: hit.codes,
                rationale: hit.rationale,
            }));
        }

        let mut prompt = format!("Industry description (what the user SELLS): {}", description);
        if let Some(excl) = exclusion {
            prompt.push_str(&format!(
                "\nEXCLUSION CONTEXT (IMPORTANT): {}\nExclude any codes that match the excluded categories mentioned above.",
                excl
            ));
        }

        info!("Mapping industry to codes: '{}'", description);
        let raw: RawMapping =
            invoke_structured(self.client.as_ref(), SYSTEM_PROMPT, &prompt, &self.tool).await?;

        let raw_codes: Vec<String> = raw
            .codes
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let codes = validate_codes(raw_codes.iter().map(String::as_str), self.max_codes);
        let rationale = raw.rationale.filter(|r| !r.trim().is_empty());

        if codes.is_empty() {
            warn!("No valid codes for industry '{}'", description);
            return Ok(Resolution::NotFound {
                industry: description.to_string(),
                rationale: rationale.unwrap_or_else(|| DEFAULT_NOT_FOUND_RATIONALE.to_string()),
            });
        }

        let rationale = rationale.unwrap_or_else(|| {
            "Codes selected from domain knowledge of the service's primary buyers.".to_string()
        });
        info!("Mapped '{}' to {} codes: {:?}", description, codes.len(), codes);
        self.cache.insert(
            cache_key,
            CachedMapping {
                codes: codes.clone(),
                rationale: rationale.clone(),
            },
        );
        Ok(Resolution::Resolved(SicContext {
            industry_input: description.to_string(),
            codes,
            rationale,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentic::ScriptedClient;
    use crate::config::WorkflowConfig;
    use crate::workflow::memory::record_user_turn;
    use crate::workflow::state::WorkflowState;

    fn resolver(client: Arc<ScriptedClient>) -> IndustryResolver {
        IndustryResolver::new(client, 16, 50)
    }

    #[test]
    fn test_validate_codes() {
        let raw = ["7342", "SIC 0782", "12345", "9100", "734", "7342", "0100"];
        assert_eq!(validate_codes(raw, 50), vec!["7342", "0782", "0100"]);
        assert_eq!(validate_codes(raw, 1), vec!["7342"]);
    }

    #[test]
    fn test_description_with_target() {
        assert_eq!(
            industry_description("payroll software ", Some("startups")),
            "payroll software for startups"
        );
    }

    #[test]
    fn test_exclusion_word_boundaries() {
        let config = WorkflowConfig::default();
        let mut state = WorkflowState::new("t");
        record_user_turn(&mut state, "another thing: nothing fancy", &config);
        assert_eq!(find_exclusion(&state.conversation, 5), None);
        record_user_turn(&mut state, "please exclude golf clubs", &config);
        record_user_turn(&mut state, "Texas", &config);
        assert_eq!(
            find_exclusion(&state.conversation, 5).as_deref(),
            Some("please exclude golf clubs")
        );
        assert_eq!(find_exclusion(&state.conversation, 1), None);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_model() {
        let client = Arc::new(ScriptedClient::new());
        client.push_tool_response(
            INDUSTRY_TOOL,
            serde_json::json!({"industry": "pest control", "codes": ["5812", "7011"], "rationale": "restaurants and hotels"}),
        );
        let resolver = resolver(client.clone());

        let first = resolver.resolve("Pest Control", None, None).await.unwrap();
        let second = resolver.resolve("  pest control ", None, None).await.unwrap();
        assert_eq!(client.tool_call_count(INDUSTRY_TOOL), 1);
        match (first, second) {
            (Resolution::Resolved(a), Resolution::Resolved(b)) => assert_eq!(a.codes, b.codes),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exclusion_is_part_of_cache_key() {
        let client = Arc::new(ScriptedClient::new());
        client.set_tool_default(
            INDUSTRY_TOOL,
            serde_json::json!({"industry": "x", "codes": ["7997"], "rationale": "clubs"}),
        );
        let resolver = resolver(client.clone());
        resolver.resolve("landscaping", None, None).await.unwrap();
        resolver
            .resolve("landscaping", None, Some("without golf clubs"))
            .await
            .unwrap();
        assert_eq!(client.tool_call_count(INDUSTRY_TOOL), 2);
        assert!(client.tool_prompts(INDUSTRY_TOOL)[1].contains("EXCLUSION CONTEXT"));
    }

    #[tokio::test]
    async fn test_no_valid_codes_is_not_found() {
        let client = Arc::new(ScriptedClient::new());
        client.push_tool_response(
            INDUSTRY_TOOL,
            serde_json::json!({"industry": "xyzabc nonsense", "codes": ["99999", "abc"], "rationale": "Not a real industry."}),
        );
        let resolver = resolver(client);
        let result = resolver.resolve("xyzabc nonsense", None, None).await.unwrap();
        assert_eq!(
            result,
            Resolution::NotFound {
                industry: "xyzabc nonsense".into(),
                rationale: "Not a real industry.".into()
            }
        );
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    async fn test_multi_industry_union() {
        let client = Arc::new(ScriptedClient::new());
        client.push_tool_response(
            INDUSTRY_TOOL,
            serde_json::json!({"industry": "a", "codes": ["5812", "7011"], "rationale": "r1"}),
        );
        client.push_tool_response(
            INDUSTRY_TOOL,
            serde_json::json!({"industry": "b", "codes": ["7011", "8062"], "rationale": "r2"}),
        );
        let resolver = resolver(client);
        let Resolution::Resolved(ctx) = resolver
            .resolve("linen supply, food distribution", None, None)
            .await
            .unwrap()
        else {
            panic!("expected codes");
        };
        assert_eq!(ctx.codes, vec!["5812", "7011", "8062"]);
        assert_eq!(ctx.industry_input, "linen supply, food distribution");
        assert!(ctx.rationale.starts_with("Multiple industries mapped:"));
    }

    #[tokio::test]
    async fn test_capability_failure_is_err() {
        let client = Arc::new(ScriptedClient::new());
        client.push_tool_error(INDUSTRY_TOOL, "timeout");
        let resolver = resolver(client);
        assert!(resolver.resolve("plumbing", None, None).await.is_err());
    }
}
