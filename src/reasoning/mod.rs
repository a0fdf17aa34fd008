//! The reasoning pipeline.
//!
//! [`ReasoningEngine`] orchestrates one query end to end: pattern retrieval,
//! step and answer generation, quality scoring, refinement and pattern
//! extraction. The supporting pieces live in submodules:
//!
//! - [`steps`]: parsing numbered reasoning steps out of generated text
//! - [`generation`]: the shared step/answer generation primitives
//! - [`refinement`]: the convergence-bounded refinement loop
//! - [`preferences`] and [`context`]: caller-provided conversation context

pub mod context;
pub mod engine;
pub mod generation;
pub mod preferences;
pub mod refinement;
pub mod steps;

pub use context::ContextSynthesizer;
pub use engine::{
    OutcomeMetadata, ReasoningEngine, ReasoningOutcome, ReasoningRequest, RefinementSummary,
};
pub use generation::{GenerationContext, LlmStepGenerator, StepGenerator};
pub use preferences::{PreferenceSummary, PreferenceTracker};
pub use refinement::{ConvergenceReason, RefinementIteration, RefinementLoop, RefinementResult};
pub use steps::parse_reasoning_steps;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One numbered step of a reasoning chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based position in the chain.
    pub step_number: usize,
    /// What the step does.
    pub description: String,
    /// When the step was parsed.
    pub timestamp: DateTime<Utc>,
}

impl ReasoningStep {
    /// Create a step stamped with the current time
    pub fn new(step_number: usize, description: impl Into<String>) -> Self {
        Self {
            step_number,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A prior exchange supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// What the user asked.
    pub query_text: String,
    /// What the pipeline answered.
    #[serde(default)]
    pub response_text: String,
}

impl ConversationTurn {
    /// Create a turn
    pub fn new(query_text: impl Into<String>, response_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            response_text: response_text.into(),
        }
    }
}

/// Render steps as a numbered list, renumbered from 1.
pub fn format_steps(steps: &[ReasoningStep]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step.description))
        .collect::<Vec<_>>()
        .join("\n")
}
