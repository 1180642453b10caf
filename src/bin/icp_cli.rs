//! ICP Query Command Line Interface
//!
//! # Usage
//!
//! ```bash
//! # Interactive conversation (one utterance per line)
//! icp_cli chat --thread demo
//!
//! # Persist threads between runs and execute validated SQL
//! icp_cli chat --thread demo --checkpoint-dir .icp/threads --execute
//!
//! # Share threads between processes through Postgres
//! icp_cli chat --thread demo --pg-checkpoints
//!
//! # Check a statement with the safety validator
//! echo "SELECT * FROM icp_data; DROP TABLE icp_data" | icp_cli validate
//! ```

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use icp_query::checkpoint::{
    is_valid_thread_id, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
use icp_query::config::{LlmSettings, WorkflowConfig};
use icp_query::sql::SqlSafetyValidator;
use icp_query::workflow::{Engine, QueryAssistant, TurnOutcome};

#[derive(Parser)]
#[command(name = "icp_cli")]
#[command(version = "0.1.0")]
#[command(about = "Conversational text-to-SQL over the ICP prospect table")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workflow config file (defaults to $ICP_CONFIG or config/workflow.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Read utterances from stdin and print questions or SQL
    Chat {
        /// Conversation thread id (a fresh one if omitted)
        #[arg(long, short)]
        thread: Option<String>,

        /// Directory for per-thread checkpoint files (in-memory if omitted)
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Keep checkpoints in the icp_checkpoints table at DATABASE_URL
        #[arg(long, conflicts_with = "checkpoint_dir")]
        pg_checkpoints: bool,

        /// Run validated SQL against DATABASE_URL (requires the `database` feature)
        #[arg(long)]
        execute: bool,
    },

    /// Validate one SQL statement (argument or stdin)
    Validate { sql: Option<String> },

    /// Delete a persisted thread
    Reset {
        #[arg(long, short)]
        thread: String,

        #[arg(long)]
        checkpoint_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Chat {
            thread,
            checkpoint_dir,
            pg_checkpoints,
            execute,
        } => {
            let thread =
                thread.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4().simple()));
            cmd_chat(cli.config, &thread, pg_checkpoints, checkpoint_dir, execute, cli.format).await
        }
        Commands::Validate { sql } => cmd_validate(sql, cli.format),
        Commands::Reset {
            thread,
            checkpoint_dir,
        } => cmd_reset(&thread, checkpoint_dir).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<WorkflowConfig> {
    let config = match path {
        Some(path) => WorkflowConfig::load_from_file(&path)?,
        None => WorkflowConfig::load()?,
    };
    Ok(config)
}

async fn open_store(
    pg_checkpoints: bool,
    dir: Option<PathBuf>,
) -> Result<Arc<dyn CheckpointStore>> {
    if pg_checkpoints {
        return open_pg_store().await;
    }
    let store: Arc<dyn CheckpointStore> = match dir {
        Some(dir) => Arc::new(FileCheckpointStore::new(dir)),
        None => Arc::new(InMemoryCheckpointStore::new()),
    };
    Ok(store)
}

async fn cmd_chat(
    config_path: Option<PathBuf>,
    thread: &str,
    pg_checkpoints: bool,
    checkpoint_dir: Option<PathBuf>,
    execute: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let store = open_store(pg_checkpoints, checkpoint_dir).await?;
    let max_rows = config.max_result_rows;
    let settings = LlmSettings::from_env()?;
    let mut builder = Engine::builder(settings.client()).config(config);
    let executor = if execute {
        let (executor, schema) = connect_database().await?;
        builder = builder.schema(schema);
        Some(executor)
    } else {
        None
    };
    let assistant = QueryAssistant::new(builder.build(), store);

    if format == OutputFormat::Pretty {
        println!(
            "{} Describe who you want to reach. Empty line or Ctrl-D to quit. (thread {})",
            "icp>".cyan().bold(),
            thread
        );
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let utterance = line.trim();
        if utterance.is_empty() {
            break;
        }

        let outcome = assistant.handle_turn(thread, utterance).await?;
        print_outcome(&outcome, format)?;

        if let (Some(executor), Some(sql)) = (&executor, validated(&outcome)) {
            run_query(executor.as_ref(), sql, max_rows, format).await;
        }
        if format == OutputFormat::Pretty {
            print!("{} ", "you>".green().bold());
            io::stdout().flush().ok();
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn validated(outcome: &TurnOutcome) -> Option<&str> {
    match outcome.sql_valid {
        Some(true) => outcome.sql_query.as_deref(),
        _ => None,
    }
}

fn print_outcome(outcome: &TurnOutcome, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }

    if let Some(question) = &outcome.pending_question {
        println!("{} {}", "icp>".cyan().bold(), question);
        return Ok(());
    }
    if let Some(sql) = validated(outcome) {
        println!("{}", "Generated SQL:".bold());
        println!("  {}", sql.yellow());
        if let Some(sic) = &outcome.sic_context {
            println!("  {} {}", "industry codes:".dimmed(), sic.codes.join(", "));
        }
        for warning in &outcome.sql_warnings {
            println!("  {} {}", "warning:".yellow(), warning);
        }
    }
    if let Some(error) = &outcome.sql_error {
        println!("{} {}", "icp>".red().bold(), error);
    }
    Ok(())
}

type Connected = (
    Box<dyn icp_query::database::QueryExecutor>,
    Arc<dyn icp_query::database::SchemaIntrospector>,
);

#[cfg(feature = "database")]
async fn connect_database() -> Result<Connected> {
    use icp_query::database::{DatabaseManager, PgQueryExecutor, PgSchemaIntrospector};

    let manager = DatabaseManager::with_default_config()
        .await
        .context("Failed to connect to DATABASE_URL")?;
    let pool = manager.pool().clone();
    Ok((
        Box::new(PgQueryExecutor::new(pool.clone())),
        Arc::new(PgSchemaIntrospector::new(pool)),
    ))
}

#[cfg(not(feature = "database"))]
async fn connect_database() -> Result<Connected> {
    anyhow::bail!("--execute requires icp_cli built with the `database` feature")
}

#[cfg(feature = "database")]
async fn open_pg_store() -> Result<Arc<dyn CheckpointStore>> {
    use icp_query::database::{DatabaseManager, PgCheckpointStore};

    let manager = DatabaseManager::with_default_config()
        .await
        .context("Failed to connect to DATABASE_URL")?;
    let store = PgCheckpointStore::new(manager.pool().clone());
    store.ensure_table().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_pg_store() -> Result<Arc<dyn CheckpointStore>> {
    anyhow::bail!("--pg-checkpoints requires icp_cli built with the `database` feature")
}

async fn run_query(
    executor: &dyn icp_query::database::QueryExecutor,
    sql: &str,
    max_rows: usize,
    format: OutputFormat,
) {
    match executor.execute(sql, max_rows).await {
        Ok(result) if format == OutputFormat::Json => {
            println!("{}", serde_json::json!({ "results": result }));
        }
        Ok(result) => {
            println!(
                "{} {} matching rows (showing {})",
                "Results:".bold(),
                result.total_count,
                result.rows.len()
            );
            for row in &result.rows {
                println!("  {}", serde_json::Value::Object(row.clone()));
            }
        }
        Err(e) => eprintln!("{} {}", "query failed:".red().bold(), e),
    }
}

fn cmd_validate(sql: Option<String>, format: OutputFormat) -> Result<ExitCode> {
    let sql = match sql {
        Some(sql) => sql,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let result = SqlSafetyValidator::new().validate(&sql);
    match (format, &result) {
        (OutputFormat::Json, Ok(())) => println!("{}", serde_json::json!({ "valid": true })),
        (OutputFormat::Json, Err(reason)) => println!(
            "{}",
            serde_json::json!({ "valid": false, "error": reason.to_string() })
        ),
        (OutputFormat::Pretty, Ok(())) => println!("{}", "✓ SQL is safe".green().bold()),
        (OutputFormat::Pretty, Err(reason)) => {
            println!("{} {}", "✗".red().bold(), reason)
        }
    }
    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_reset(thread: &str, checkpoint_dir: PathBuf) -> Result<ExitCode> {
    if !is_valid_thread_id(thread) {
        anyhow::bail!("Invalid thread id '{}'", thread);
    }
    let store = FileCheckpointStore::new(checkpoint_dir);
    store.delete(thread).await?;
    println!("{} thread '{}' removed", "✓".green().bold(), thread);
    Ok(ExitCode::SUCCESS)
}
