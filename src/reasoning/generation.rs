//! Step and answer generation shared by the engine and the refinement loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::steps::parse_reasoning_steps;
use super::{format_steps, ReasoningStep};
use crate::error::LlmResult;
use crate::llm::{Generation, GenerationRequest, TextGenerator, TokenUsage};
use crate::prompts::{reasoning_steps_prompt, response_prompt};

/// Characters of caller history forwarded into prompts.
pub const HISTORY_CHARS: usize = 200;

const STEPS_TEMPERATURE: f64 = 0.7;
const STEPS_MAX_TOKENS: u32 = 800;
const RESPONSE_TEMPERATURE: f64 = 0.7;
const RESPONSE_MAX_TOKENS: u32 = 500;

/// Optional prompt sections injected around the task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationContext {
    /// Formatted learned-pattern block.
    pub pattern_guidance: Option<String>,
    /// Cumulative user preference block.
    pub preference_context: Option<String>,
    /// Prior conversation, already truncated.
    pub history: Option<String>,
    /// Instructions for a refinement round.
    pub refinement_prompt: Option<String>,
}

impl GenerationContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pattern guidance
    pub fn with_pattern_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.pattern_guidance = Some(guidance.into());
        self
    }

    /// Set preference context
    pub fn with_preference_context(mut self, preferences: impl Into<String>) -> Self {
        self.preference_context = Some(preferences.into());
        self
    }

    /// Set history, keeping only its first [`HISTORY_CHARS`] characters
    pub fn with_history(mut self, history: &str) -> Self {
        self.history = Some(history.chars().take(HISTORY_CHARS).collect());
        self
    }

    /// Copy of this context carrying a refinement prompt
    pub fn with_refinement_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            refinement_prompt: Some(prompt.into()),
            ..self.clone()
        }
    }
}

/// Parsed steps plus the tokens spent producing them.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSteps {
    /// Parsed reasoning steps (never empty).
    pub steps: Vec<ReasoningStep>,
    /// Token usage of the call.
    pub token_usage: TokenUsage,
}

/// Generation primitives used by every answer attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepGenerator: Send + Sync {
    /// Ask for numbered reasoning steps.
    async fn generate_steps(
        &self,
        query: &str,
        context: &GenerationContext,
    ) -> LlmResult<GeneratedSteps>;

    /// Ask for the final answer given the steps.
    async fn generate_response(
        &self,
        query: &str,
        steps: &[ReasoningStep],
        context: &GenerationContext,
    ) -> LlmResult<Generation>;
}

/// [`StepGenerator`] backed by a text-generation service.
#[derive(Clone)]
pub struct LlmStepGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl LlmStepGenerator {
    /// Create a step generator over the given service
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StepGenerator for LlmStepGenerator {
    async fn generate_steps(
        &self,
        query: &str,
        context: &GenerationContext,
    ) -> LlmResult<GeneratedSteps> {
        let prompt = reasoning_steps_prompt(
            query,
            context.pattern_guidance.as_deref(),
            context.preference_context.as_deref(),
            context.refinement_prompt.as_deref(),
            context.history.as_deref(),
        );

        let generation = self
            .generator
            .generate(
                GenerationRequest::new(prompt)
                    .with_temperature(STEPS_TEMPERATURE)
                    .with_max_tokens(STEPS_MAX_TOKENS),
            )
            .await?;

        let steps = parse_reasoning_steps(&generation.text);
        debug!(steps_count = steps.len(), "Reasoning steps generated");

        Ok(GeneratedSteps {
            steps,
            token_usage: generation.token_usage,
        })
    }

    async fn generate_response(
        &self,
        query: &str,
        steps: &[ReasoningStep],
        context: &GenerationContext,
    ) -> LlmResult<Generation> {
        let prompt = response_prompt(
            query,
            &format_steps(steps),
            context.preference_context.as_deref(),
            context.refinement_prompt.as_deref(),
            context.history.as_deref(),
        );

        self.generator
            .generate(
                GenerationRequest::new(prompt)
                    .with_temperature(RESPONSE_TEMPERATURE)
                    .with_max_tokens(RESPONSE_MAX_TOKENS),
            )
            .await
    }
}
