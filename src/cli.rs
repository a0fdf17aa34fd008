//! Command-line interface.
//!
//! Every command prints a JSON document on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::LlmClient;
use crate::patterns::{PatternRetriever, PatternStore, PatternUsageTracker};
use crate::reasoning::{ConversationTurn, ReasoningEngine, ReasoningRequest};
use crate::storage::{PatternIndex, SqliteStorage};

/// Adaptive reasoning pipeline with pattern learning.
#[derive(Parser, Debug)]
#[command(name = "adaptive-reasoning", version, about)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run a query through the reasoning pipeline
    Query {
        /// The question to answer
        text: String,

        /// Session identifier (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,

        /// Skip pattern retrieval and refinement
        #[arg(long)]
        fast: bool,

        /// JSON file holding earlier turns: [{"query_text": ..., "response_text": ...}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Inspect and manage stored patterns
    Patterns {
        /// Pattern operation
        #[command(subcommand)]
        command: PatternCommands,
    },

    /// Check the text-generation service and the database
    Health,
}

/// Pattern store subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PatternCommands {
    /// Number of stored patterns
    Count,

    /// Search stored patterns by similarity
    Search {
        /// Text to match against
        text: String,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value = "5")]
        n_results: usize,

        /// Minimum source quality
        #[arg(long, default_value = "0.0")]
        min_quality: f64,
    },

    /// Delete a pattern by id
    Delete {
        /// Pattern identifier
        id: String,
    },

    /// Usage statistics for one pattern, or retrieval statistics overall
    Stats {
        /// Pattern identifier
        #[arg(long)]
        id: Option<String>,
    },
}

/// Result of CLI command execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// JSON output
    pub message: String,
}

impl CliResult {
    /// Success with a serialized payload
    pub fn success(payload: &impl Serialize) -> Self {
        match serde_json::to_string_pretty(payload) {
            Ok(message) => Self {
                exit_code: 0,
                message,
            },
            Err(e) => Self::error(format!("Failed to serialize output: {}", e)),
        }
    }

    /// Failure with a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: json!({ "error": message.into() }).to_string(),
        }
    }
}

/// Execute a command against the configured collaborators.
pub async fn execute_command(
    command: Commands,
    config: &Config,
    storage: Arc<SqliteStorage>,
    llm: Arc<LlmClient>,
) -> CliResult {
    match command {
        Commands::Query {
            text,
            session_id,
            fast,
            history,
        } => execute_query(config, storage, llm, text, session_id, fast, history).await,
        Commands::Patterns { command } => execute_patterns(command, storage).await,
        Commands::Health => execute_health(storage, llm).await,
    }
}

async fn execute_query(
    config: &Config,
    storage: Arc<SqliteStorage>,
    llm: Arc<LlmClient>,
    text: String,
    session_id: Option<String>,
    fast: bool,
    history: Option<PathBuf>,
) -> CliResult {
    let mut request = ReasoningRequest::new(text);
    if let Some(session_id) = session_id {
        request = request.with_session_id(session_id);
    }
    if fast {
        request = request.with_fast_mode(true);
    }
    if let Some(path) = history {
        match load_history(&path) {
            Ok(turns) => request = request.with_history(turns),
            Err(message) => return CliResult::error(message),
        }
    }

    let engine = match ReasoningEngine::new(config, llm, storage.clone()) {
        Ok(engine) => engine,
        Err(e) => return CliResult::error(e.to_string()),
    };

    let outcome = match engine.process(request).await {
        Ok(outcome) => outcome,
        Err(e) => return CliResult::error(e.to_string()),
    };

    // Usage is credited once the outcome exists, outside the pipeline
    if !outcome.metadata.applied_patterns.is_empty() {
        let tracker = PatternUsageTracker::new(storage, engine.store().clone());
        let usage_ids = tracker
            .record_usage(
                &outcome.metadata.session_id,
                &outcome.metadata.applied_patterns,
                Some(outcome.metadata.initial_quality_score),
                Some(outcome.metadata.quality_score),
            )
            .await;
        info!(recorded = usage_ids.len(), "Pattern usage recorded");
    }

    CliResult::success(&outcome)
}

fn load_history(path: &Path) -> Result<Vec<ConversationTurn>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read history {}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid history {}: {}", path.display(), e))
}

async fn execute_patterns(command: PatternCommands, storage: Arc<SqliteStorage>) -> CliResult {
    let store = PatternStore::new(storage.clone());

    match command {
        PatternCommands::Count => CliResult::success(&json!({ "count": store.get_count().await })),
        PatternCommands::Search {
            text,
            n_results,
            min_quality,
        } => {
            let results = store.search(&text, n_results, min_quality, None, None).await;
            CliResult::success(&results)
        }
        PatternCommands::Delete { id } => {
            let deleted = store.delete(&id).await;
            if !deleted {
                warn!(pattern_id = %id, "Pattern not deleted");
            }
            CliResult::success(&json!({ "pattern_id": id, "deleted": deleted }))
        }
        PatternCommands::Stats { id: Some(id) } => {
            let tracker = PatternUsageTracker::new(storage, store);
            CliResult::success(&tracker.usage_stats(&id).await)
        }
        PatternCommands::Stats { id: None } => {
            CliResult::success(&PatternRetriever::new(store).retrieval_stats().await)
        }
    }
}

async fn execute_health(storage: Arc<SqliteStorage>, llm: Arc<LlmClient>) -> CliResult {
    let llm_healthy = llm.health_check().await;
    let patterns = storage.count().await;
    let database_healthy = patterns.is_ok();

    let report = json!({
        "llm": { "healthy": llm_healthy, "base_url": llm.base_url(), "model": llm.model() },
        "database": { "healthy": database_healthy, "patterns": patterns.unwrap_or(0) },
    });

    if llm_healthy && database_healthy {
        CliResult::success(&report)
    } else {
        CliResult {
            exit_code: 1,
            message: report.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::storage::PatternMetadata;
    use chrono::Utc;

    async fn collaborators() -> (Arc<SqliteStorage>, Arc<LlmClient>) {
        let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let llm = Arc::new(LlmClient::new(&Config::default().llm, RequestConfig::default()).unwrap());
        (storage, llm)
    }

    fn metadata() -> PatternMetadata {
        PatternMetadata {
            pattern_type: "factual_lookup".to_string(),
            domain: "geography".to_string(),
            quality_score: 0.9,
            extracted_at: Utc::now(),
            usage_count: 0,
            success_rate: 0.0,
            applicability: "Capital questions".to_string(),
            reasoning_steps: vec![],
            success_indicators: vec![],
        }
    }

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from([
            "adaptive-reasoning",
            "query",
            "What is Rust?",
            "--session-id",
            "s1",
            "--fast",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Query {
                text: "What is Rust?".to_string(),
                session_id: Some("s1".to_string()),
                fast: true,
                history: None,
            }
        );
    }

    #[test]
    fn test_parse_pattern_search() {
        let cli = Cli::try_parse_from([
            "adaptive-reasoning",
            "patterns",
            "search",
            "capital",
            "-n",
            "2",
            "--min-quality",
            "0.8",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Patterns {
                command: PatternCommands::Search {
                    text: "capital".to_string(),
                    n_results: 2,
                    min_quality: 0.8,
                }
            }
        );
    }

    #[tokio::test]
    async fn test_patterns_count_and_delete() {
        let (storage, llm) = collaborators().await;
        storage
            .add("pattern_a", "Capital city of France", &metadata())
            .await
            .unwrap();
        let config = Config::default();

        let count = execute_command(
            Commands::Patterns {
                command: PatternCommands::Count,
            },
            &config,
            storage.clone(),
            llm.clone(),
        )
        .await;
        assert_eq!(count.exit_code, 0);
        let value: serde_json::Value = serde_json::from_str(&count.message).unwrap();
        assert_eq!(value["count"], 1);

        let deleted = execute_command(
            Commands::Patterns {
                command: PatternCommands::Delete {
                    id: "pattern_a".to_string(),
                },
            },
            &config,
            storage.clone(),
            llm,
        )
        .await;
        let value: serde_json::Value = serde_json::from_str(&deleted.message).unwrap();
        assert_eq!(value["deleted"], true);
        assert_eq!(storage.count().await.unwrap(), 0);
    }

    #[test]
    fn test_missing_history_file() {
        let err = load_history(Path::new("/nonexistent/history.json")).unwrap_err();
        assert!(err.contains("Failed to read history"));
    }
}
