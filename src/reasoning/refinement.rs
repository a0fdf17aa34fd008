//! Convergence-bounded refinement of low-quality answers.
//!
//! The loop regenerates an answer with an iteration-specific refinement
//! prompt, re-scores it and stops on the first convergence condition. The
//! best answer seen so far is carried in an explicit [`RefinementState`]
//! accumulator, so a late regression never replaces a better earlier answer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::generation::{GenerationContext, StepGenerator};
use super::ReasoningStep;
use crate::config::RefinementConfig;
use crate::error::{AppResult, LlmResult};
use crate::llm::TokenUsage;
use crate::prompts::{refinement_critique_prompt, refinement_final_prompt};
use crate::quality::{QualityResult, Scorer};

/// Why a refinement run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// The latest answer reached the quality threshold.
    QualityThresholdMet,
    /// The latest gain was smaller than the minimum improvement.
    PlateauDetected,
    /// The latest answer dropped by more than the tolerance.
    QualityDegraded,
    /// The iteration budget ran out.
    MaxIterationsReached,
}

impl ConvergenceReason {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvergenceReason::QualityThresholdMet => "quality_threshold_met",
            ConvergenceReason::PlateauDetected => "plateau_detected",
            ConvergenceReason::QualityDegraded => "quality_degraded",
            ConvergenceReason::MaxIterationsReached => "max_iterations_reached",
        }
    }
}

impl std::fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One regenerate-and-rescore cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementIteration {
    /// 1 for the initial answer.
    pub iteration: usize,
    /// Answer text.
    pub response: String,
    /// Steps behind the answer.
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Quality score of the answer.
    pub quality: f64,
    /// Full assessment of the answer.
    pub quality_result: QualityResult,
    /// Prompt that produced it; `None` for the initial answer.
    pub refinement_prompt: Option<String>,
    /// When the iteration finished.
    pub timestamp: DateTime<Utc>,
}

/// Outcome of refining one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementResult {
    /// Best answer seen.
    pub response: String,
    /// Steps behind the best answer.
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Iterations performed, including the initial answer.
    pub iterations: usize,
    /// Quality of every iteration in order.
    pub quality_progression: Vec<f64>,
    /// Quality of the best answer.
    pub final_quality: f64,
    /// Full assessment of the best answer.
    pub final_quality_result: QualityResult,
    /// Why the run stopped.
    pub convergence_reason: ConvergenceReason,
    /// Every iteration, initial answer first.
    pub iteration_history: Vec<RefinementIteration>,
    /// Tokens spent by refinement rounds.
    pub token_usage: TokenUsage,
}

/// Running state of a refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementState {
    /// Index into `history` of the best iteration.
    best: usize,
    history: Vec<RefinementIteration>,
    token_usage: TokenUsage,
}

impl RefinementState {
    /// Start from the initial answer
    pub fn start(initial: RefinementIteration) -> Self {
        Self {
            best: 0,
            history: vec![initial],
            token_usage: TokenUsage::default(),
        }
    }

    /// Append an iteration, keeping the best strictly-higher quality
    pub fn advance(mut self, iteration: RefinementIteration) -> Self {
        if iteration.quality > self.best().quality {
            self.best = self.history.len();
        }
        self.history.push(iteration);
        self
    }

    /// Best iteration so far
    pub fn best(&self) -> &RefinementIteration {
        &self.history[self.best]
    }

    /// Most recent iteration
    pub fn latest(&self) -> &RefinementIteration {
        &self.history[self.history.len() - 1]
    }

    /// Quality of every iteration in order
    pub fn quality_progression(&self) -> Vec<f64> {
        self.history.iter().map(|i| i.quality).collect()
    }

    /// Finish the run
    pub fn finish(self, convergence_reason: ConvergenceReason) -> RefinementResult {
        let quality_progression = self.quality_progression();
        let best = self.history[self.best].clone();
        RefinementResult {
            response: best.response,
            reasoning_steps: best.reasoning_steps,
            iterations: self.history.len(),
            quality_progression,
            final_quality: best.quality,
            final_quality_result: best.quality_result,
            convergence_reason,
            iteration_history: self.history,
            token_usage: self.token_usage,
        }
    }
}

/// Regenerates answers until quality converges or the budget runs out.
#[derive(Clone)]
pub struct RefinementLoop {
    config: RefinementConfig,
    generator: Arc<dyn StepGenerator>,
    scorer: Arc<dyn Scorer>,
}

impl RefinementLoop {
    /// Create a loop; rejects invalid thresholds
    pub fn new(
        config: RefinementConfig,
        generator: Arc<dyn StepGenerator>,
        scorer: Arc<dyn Scorer>,
    ) -> AppResult<Self> {
        config.validate()?;
        info!(
            max_iterations = config.max_iterations,
            quality_threshold = config.quality_threshold,
            "Refinement loop initialized"
        );
        Ok(Self {
            config,
            generator,
            scorer,
        })
    }

    /// Loop configuration
    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// True iff `quality` is below the threshold
    pub fn should_refine(&self, quality: f64) -> bool {
        quality < self.config.quality_threshold
    }

    /// Refine an initial answer.
    ///
    /// Never fails: a generation error ends the run with the best answer so
    /// far.
    pub async fn refine(
        &self,
        query: &str,
        initial_response: &str,
        initial_steps: &[ReasoningStep],
        initial_quality: QualityResult,
        context: &GenerationContext,
    ) -> RefinementResult {
        info!(
            initial_quality = initial_quality.quality_score,
            threshold = self.config.quality_threshold,
            "Refinement started"
        );

        let mut state = RefinementState::start(RefinementIteration {
            iteration: 1,
            response: initial_response.to_string(),
            reasoning_steps: initial_steps.to_vec(),
            quality: initial_quality.quality_score,
            quality_result: initial_quality,
            refinement_prompt: None,
            timestamp: Utc::now(),
        });

        if !self.should_refine(initial_quality.quality_score) {
            info!(
                quality = initial_quality.quality_score,
                "Refinement not needed"
            );
            return state.finish(ConvergenceReason::QualityThresholdMet);
        }

        for iteration in 2..=self.config.max_iterations {
            let best = state.best();
            info!(iteration, current_quality = best.quality, "Refinement iteration started");

            let prompt = self.refinement_prompt(iteration, best.quality, &best.response);
            let iteration_context = context.with_refinement_prompt(prompt.clone());

            let attempt = match self.attempt(query, &iteration_context).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    error!(iteration, error = %e, "Refinement iteration failed");
                    break;
                }
            };

            let (steps, response, usage) = attempt;
            let quality_result = self.scorer.score(query, &response, &steps).await;
            let previous_quality = state.latest().quality;

            state.token_usage.accumulate(usage);
            state = state.advance(RefinementIteration {
                iteration,
                response,
                reasoning_steps: steps,
                quality: quality_result.quality_score,
                quality_result,
                refinement_prompt: Some(prompt),
                timestamp: Utc::now(),
            });

            info!(
                iteration,
                quality = quality_result.quality_score,
                improvement = quality_result.quality_score - previous_quality,
                "Refinement iteration complete"
            );

            if let Some(reason) =
                self.check_convergence(iteration, previous_quality, quality_result.quality_score)
            {
                info!(
                    reason = %reason,
                    iterations = iteration,
                    final_quality = state.best().quality,
                    "Refinement converged"
                );
                return state.finish(reason);
            }
        }

        info!(
            iterations = state.history.len(),
            final_quality = state.best().quality,
            "Refinement stopped without converging"
        );
        state.finish(ConvergenceReason::MaxIterationsReached)
    }

    async fn attempt(
        &self,
        query: &str,
        context: &GenerationContext,
    ) -> LlmResult<(Vec<ReasoningStep>, String, TokenUsage)> {
        let generated = self.generator.generate_steps(query, context).await?;
        let generation = self
            .generator
            .generate_response(query, &generated.steps, context)
            .await?;

        let mut usage = generated.token_usage;
        usage.accumulate(generation.token_usage);
        Ok((generated.steps, generation.text, usage))
    }

    /// Prompt for one refinement round
    pub fn refinement_prompt(
        &self,
        iteration: usize,
        previous_quality: f64,
        previous_response: &str,
    ) -> String {
        if iteration <= 2 {
            refinement_critique_prompt(
                iteration,
                previous_quality,
                self.config.quality_threshold,
                previous_response,
            )
        } else {
            refinement_final_prompt(
                iteration,
                previous_quality,
                &focus_areas(previous_quality),
                previous_response,
            )
        }
    }

    /// First stopping condition that holds for a new quality sample
    pub fn check_convergence(
        &self,
        iteration: usize,
        previous_quality: f64,
        quality: f64,
    ) -> Option<ConvergenceReason> {
        if quality >= self.config.quality_threshold {
            return Some(ConvergenceReason::QualityThresholdMet);
        }

        let improvement = quality - previous_quality;
        if improvement < self.config.min_quality_improvement {
            return Some(ConvergenceReason::PlateauDetected);
        }
        if improvement < -self.config.plateau_tolerance {
            return Some(ConvergenceReason::QualityDegraded);
        }

        if iteration >= self.config.max_iterations {
            return Some(ConvergenceReason::MaxIterationsReached);
        }

        None
    }
}

/// Areas to emphasize on the final refinement round.
pub fn focus_areas(previous_quality: f64) -> Vec<&'static str> {
    let mut areas = Vec::new();
    if previous_quality < 0.7 {
        areas.push("accuracy and correctness");
    }
    if previous_quality < 0.8 {
        areas.push("completeness and detail");
    }
    areas.push("clarity and structure");
    areas
}
