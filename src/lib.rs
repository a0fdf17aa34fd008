//! # Adaptive Reasoning
//!
//! An adaptive reasoning pipeline around a text-generation service. Each
//! answer is scored, low-quality answers are refined until quality
//! converges, and high-quality answers are distilled into reusable reasoning
//! patterns that guide future queries.
//!
//! ## Features
//!
//! - **Quality Scoring**: Rule-based heuristics blended with a model-graded assessment
//! - **Refinement Loop**: Convergence-bounded regeneration that never returns a worse answer
//! - **Pattern Extraction**: Schema-validated distillation of high-quality answers
//! - **Pattern Retrieval**: Composite ranking of similarity, quality, success rate and usage
//! - **Usage Tracking**: Per-query pattern effectiveness folded back into the store
//! - **Conversation Context**: Cumulative preference tracking across turns
//!
//! ## Architecture
//!
//! ```text
//! query → PatternRetriever → StepGenerator → QualityScorer → RefinementLoop
//!              ↑                                                  ↓
//!         PatternStore  ←──────────────── PatternExtractor ←──────┘
//!              ↓
//!        SQLite (patterns, pattern_usage)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adaptive_reasoning::{Config, ReasoningEngine, ReasoningRequest};
//! use adaptive_reasoning::llm::LlmClient;
//! use adaptive_reasoning::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let llm = Arc::new(LlmClient::new(&config.llm, config.request.clone())?);
//!     let engine = ReasoningEngine::new(&config, llm, storage)?;
//!     let outcome = engine.process(ReasoningRequest::new("What is the capital of France?")).await?;
//!     println!("{}", outcome.response);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Command-line subcommands and their execution.
pub mod cli;
/// Configuration management for the pipeline.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Text-generation client and types.
pub mod llm;
/// Pattern extraction, storage, retrieval and usage tracking.
pub mod patterns;
/// Prompt templates for every generation call.
pub mod prompts;
/// Answer quality scoring.
pub mod quality;
/// Step generation, refinement and the orchestrating engine.
pub mod reasoning;
/// SQLite storage layer for patterns and usage.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use reasoning::{ReasoningEngine, ReasoningOutcome, ReasoningRequest};
