//! SQL safety validator
//!
//! Deterministic gatekeeper applied to every synthesized statement before it
//! can be executed. Checks run in a fixed order and stop at the first
//! failure; the order decides which message a bad input receives:
//!
//! 1. non-empty
//! 2. starts with `SELECT` or `WITH`
//! 3. single statement (one optional trailing `;`, quoted `;` ignored)
//! 4. parses as exactly one statement
//! 5. the only DML keyword is `SELECT`
//! 6. no dangerous keyword
//! 7. `WITH` is followed by a `SELECT`
//! 8. no injection pattern
//!
//! Keyword checks run over unquoted word tokens, so column names such as
//! `delete_flag` and literals such as `'update'` are allowed.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use thiserror::Error;
use tracing::{debug, info, warn};

use self::patterns::{injection_regexes, InjectionPattern};
use super::comments::{split_statements, strip_comments};

const DML_KEYWORDS: [&str; 6] = ["SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE"];

const DANGEROUS_KEYWORDS: [&str; 22] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE",
    "MERGE", "REPLACE", "GRANT", "REVOKE", "COMMIT", "ROLLBACK", "LOCK", "UNLOCK", "BACKUP",
    "RESTORE", "COPY", "IMPORT", "EXPORT",
];

/// Why a statement was rejected. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsafeSql {
    #[error("Query is empty")]
    Empty,

    #[error("Only SELECT queries are allowed. Query must start with SELECT or WITH (for CTEs)")]
    NotSelect,

    #[error(
        "Multiple SQL statements detected ({count} found). Only single SELECT queries are allowed.{}",
        dangerous_suffix(.dangerous)
    )]
    MultipleStatements {
        count: usize,
        /// First dangerous keyword found in the trailing statements
        dangerous: Option<String>,
    },

    #[error("Failed to parse SQL query")]
    Unparsed,

    #[error("SQL parsing error: {0}")]
    Parse(String),

    #[error("Only SELECT queries are allowed. Found: {0}")]
    NonSelectDml(String),

    #[error("Dangerous operation detected: {0}")]
    DangerousKeyword(String),

    #[error("WITH clause must be followed by a SELECT statement")]
    WithoutSelect,

    #[error("Potential SQL injection detected: {0}")]
    Injection(String),
}

fn dangerous_suffix(dangerous: &Option<String>) -> String {
    match dangerous {
        Some(keyword) => format!(" Dangerous operation detected: {}", keyword),
        None => String::new(),
    }
}

/// Stateless validator; cheap to construct and share
#[derive(Debug, Clone, Default)]
pub struct SqlSafetyValidator;

impl SqlSafetyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `sql`, returning the first failing reason
    pub fn validate(&self, sql: &str) -> Result<(), UnsafeSql> {
        debug!("Validating SQL query: {}", crate::workflow::memory::truncate(sql, 100));
        let result = self.run_checks(sql);
        match &result {
            Ok(()) => info!("SQL validation passed - query is safe"),
            Err(reason) => warn!("SQL validation failed: {}", reason),
        }
        result
    }

    fn run_checks(&self, sql: &str) -> Result<(), UnsafeSql> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(UnsafeSql::Empty);
        }

        let upper = trimmed.to_uppercase();
        if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
            return Err(UnsafeSql::NotSelect);
        }

        let stripped = strip_comments(trimmed);
        self.check_single_statement(&stripped)?;

        match Parser::parse_sql(&PostgreSqlDialect {}, &stripped) {
            Ok(statements) if statements.is_empty() => return Err(UnsafeSql::Unparsed),
            Ok(statements) if statements.len() > 1 => {
                return Err(UnsafeSql::MultipleStatements {
                    count: statements.len(),
                    dangerous: None,
                })
            }
            Ok(_) => {}
            Err(e) => return Err(UnsafeSql::Parse(e.to_string())),
        }

        let words = self.keywords(&stripped)?;

        if let Some(first_dml) = words.iter().find(|w| DML_KEYWORDS.contains(&w.as_str())) {
            if first_dml != "SELECT" {
                return Err(UnsafeSql::NonSelectDml(first_dml.clone()));
            }
        }
        if let Some(other) = words
            .iter()
            .find(|w| w.as_str() != "SELECT" && DML_KEYWORDS.contains(&w.as_str()))
        {
            return Err(UnsafeSql::NonSelectDml(other.clone()));
        }

        if let Some(danger) = words
            .iter()
            .find(|w| DANGEROUS_KEYWORDS.contains(&w.as_str()))
        {
            return Err(UnsafeSql::DangerousKeyword(danger.clone()));
        }

        if upper.starts_with("WITH") && !words.iter().any(|w| w == "SELECT") {
            return Err(UnsafeSql::WithoutSelect);
        }

        check_injection(&stripped)
    }

    fn check_single_statement(&self, stripped: &str) -> Result<(), UnsafeSql> {
        let segments = split_statements(stripped);
        let statements: Vec<&str> = segments
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        let semicolons = segments.len() - 1;
        let trailing_only = semicolons == 0
            || (semicolons == 1 && segments.last().is_some_and(|s| s.trim().is_empty()));

        if statements.len() <= 1 && trailing_only {
            return Ok(());
        }

        let dangerous = statements.iter().skip(1).find_map(|s| {
            self.keywords(s)
                .ok()?
                .into_iter()
                .find(|w| DANGEROUS_KEYWORDS.contains(&w.as_str()))
        });
        Err(UnsafeSql::MultipleStatements {
            count: statements.len().max(2),
            dangerous,
        })
    }

    /// Unquoted word tokens, uppercased
    fn keywords(&self, sql: &str) -> Result<Vec<String>, UnsafeSql> {
        let tokens = Tokenizer::new(&PostgreSqlDialect {}, sql)
            .tokenize()
            .map_err(|e| UnsafeSql::Parse(e.to_string()))?;
        Ok(tokens
            .into_iter()
            .filter_map(|t| match t {
                Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
                _ => None,
            })
            .collect())
    }
}

fn check_injection(stripped: &str) -> Result<(), UnsafeSql> {
    let normalized = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();

    for InjectionPattern { label, regex } in injection_regexes() {
        if regex.is_match(&normalized) {
            return Err(UnsafeSql::Injection(label.to_string()));
        }
    }

    for union in ["UNION SELECT", "UNION ALL SELECT"] {
        if let Some(pos) = normalized.find(union) {
            let before = normalized[..pos].matches("SELECT").count();
            let after = normalized[pos..].matches("SELECT").count();
            if before == 0 || after == 0 {
                return Err(UnsafeSql::Injection("UNION SELECT".to_string()));
            }
            debug!("Legitimate UNION SELECT detected - allowing");
        }
    }

    Ok(())
}

mod patterns {
    use std::sync::OnceLock;

    use regex::Regex;

    pub struct InjectionPattern {
        pub label: &'static str,
        pub regex: Regex,
    }

    const PATTERNS: [(&str, &str); 14] = [
        ("; DROP", r"; ?DROP\b"),
        ("; DELETE", r"; ?DELETE\b"),
        ("; INSERT", r"; ?INSERT\b"),
        ("; UPDATE", r"; ?UPDATE\b"),
        ("; TRUNCATE", r"; ?TRUNCATE\b"),
        ("; ALTER", r"; ?ALTER\b"),
        ("; CREATE", r"; ?CREATE\b"),
        ("OR 1=1", r"\bOR ?1 ?= ?1(?:[^0-9.]|$)"),
        ("OR '1'='1'", r"\bOR ?'1' ?= ?'1'"),
        ("OR \"1\"=\"1\"", r#"\bOR ?"1" ?= ?"1""#),
        ("EXEC(", r"\bEXEC ?\("),
        ("EXECUTE(", r"\bEXECUTE ?\("),
        ("xp_", r"\bXP_"),
        ("sp_", r"\bSP_"),
    ];

    /// Compiled once; the patterns are constants
    pub fn injection_regexes() -> &'static [InjectionPattern] {
        static COMPILED: OnceLock<Vec<InjectionPattern>> = OnceLock::new();
        COMPILED.get_or_init(|| {
            PATTERNS
                .iter()
                .filter_map(|&(label, pattern)| {
                    Regex::new(pattern).ok().map(|regex| InjectionPattern { label, regex })
                })
                .collect()
        })
    }
}
