use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::context::ContextSynthesizer;
use super::generation::{GenerationContext, LlmStepGenerator, StepGenerator};
use super::preferences::PreferenceTracker;
use super::refinement::{
    ConvergenceReason, RefinementIteration, RefinementLoop, RefinementResult,
};
use super::{ConversationTurn, ReasoningStep};
use crate::config::{Config, RetrievalConfig};
use crate::error::AppResult;
use crate::llm::{TextGenerator, TokenUsage};
use crate::patterns::{
    AppliedPattern, Pattern, PatternExtractor, PatternPromptFormatter, PatternRetriever,
    PatternStore,
};
use crate::quality::{QualityBreakdown, QualityLevel, QualityScorer, Scorer};
use crate::storage::PatternIndex;

/// Input for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// The user's question
    pub query: String,
    /// Session identifier echoed back in the outcome
    #[serde(default)]
    pub session_id: String,
    /// Earlier exchanges of the conversation, oldest first
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Free-form prior context; takes precedence over rendered history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Overrides the configured fast-mode default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_mode: Option<bool>,
}

impl ReasoningRequest {
    /// Create a request with a fresh session id
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    /// Use a caller-provided session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Attach conversation history
    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    /// Attach free-form prior context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Force fast mode on or off
    pub fn with_fast_mode(mut self, fast_mode: bool) -> Self {
        self.fast_mode = Some(fast_mode);
        self
    }
}

/// Refinement details reported with an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSummary {
    /// Iterations performed, counting the initial answer
    pub iterations: usize,
    /// Quality of every iteration, initial first
    pub quality_progression: Vec<f64>,
    /// Why the loop stopped
    pub convergence_reason: ConvergenceReason,
    /// Every attempt in order
    pub iteration_history: Vec<RefinementIteration>,
}

impl From<&RefinementResult> for RefinementSummary {
    fn from(result: &RefinementResult) -> Self {
        Self {
            iterations: result.iterations,
            quality_progression: result.quality_progression.clone(),
            convergence_reason: result.convergence_reason,
            iteration_history: result.iteration_history.clone(),
        }
    }
}

/// Everything known about a pipeline run besides the answer itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    /// Session the query belongs to
    pub session_id: String,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the run
    pub processing_time_seconds: f64,
    /// Tokens consumed by all answer generations
    pub token_usage: TokenUsage,
    /// Whether retrieval and refinement were bypassed
    pub fast_mode: bool,
    /// Quality of the first answer, before refinement
    pub initial_quality_score: f64,
    /// Quality of the returned answer
    pub quality_score: f64,
    /// Bucket of `quality_score`
    pub quality_level: QualityLevel,
    /// Assessment of the returned answer
    pub quality_breakdown: QualityBreakdown,
    /// Number of patterns injected into the prompt
    pub patterns_retrieved: usize,
    /// Ids of the injected patterns
    pub pattern_ids: Vec<String>,
    /// Usage-tracking records for the injected patterns
    pub applied_patterns: Vec<AppliedPattern>,
    /// Present when the refinement loop ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementSummary>,
    /// Whether a new pattern was distilled
    pub pattern_extracted: bool,
    /// Id of the distilled pattern
    pub pattern_id: Option<String>,
    /// Whether the distilled pattern reached the store
    pub pattern_stored: bool,
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOutcome {
    /// Final answer
    pub response: String,
    /// Steps behind the final answer
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Run metadata
    pub metadata: OutcomeMetadata,
    /// Pattern distilled from this run, if any
    pub extracted_pattern: Option<Pattern>,
}

/// Orchestrates retrieval, generation, scoring, refinement and extraction
pub struct ReasoningEngine {
    step_generator: Arc<dyn StepGenerator>,
    scorer: Arc<dyn Scorer>,
    refinement: RefinementLoop,
    extractor: PatternExtractor,
    store: PatternStore,
    retriever: PatternRetriever,
    formatter: PatternPromptFormatter,
    preferences: PreferenceTracker,
    synthesizer: ContextSynthesizer,
    retrieval: RetrievalConfig,
    fast_mode: bool,
}

impl ReasoningEngine {
    /// Build the pipeline over a text-generation service and a pattern index.
    ///
    /// Fails when the refinement or retrieval settings are invalid.
    pub fn new(
        config: &Config,
        generator: Arc<dyn TextGenerator>,
        index: Arc<dyn PatternIndex>,
    ) -> AppResult<Self> {
        let step_generator: Arc<dyn StepGenerator> =
            Arc::new(LlmStepGenerator::new(generator.clone()));
        let scorer: Arc<dyn Scorer> = Arc::new(QualityScorer::new(generator.clone()));
        Self::with_components(config, generator, index, step_generator, scorer)
    }

    /// Build the pipeline with explicit generation and scoring components
    pub fn with_components(
        config: &Config,
        generator: Arc<dyn TextGenerator>,
        index: Arc<dyn PatternIndex>,
        step_generator: Arc<dyn StepGenerator>,
        scorer: Arc<dyn Scorer>,
    ) -> AppResult<Self> {
        config.retrieval.validate()?;
        let refinement = RefinementLoop::new(
            config.refinement.clone(),
            step_generator.clone(),
            scorer.clone(),
        )?;
        let store = PatternStore::new(index);

        Ok(Self {
            step_generator,
            scorer,
            refinement,
            extractor: PatternExtractor::new(generator.clone()),
            retriever: PatternRetriever::new(store.clone()),
            store,
            formatter: PatternPromptFormatter::new(),
            preferences: PreferenceTracker::new(),
            synthesizer: ContextSynthesizer::new(generator),
            retrieval: config.retrieval.clone(),
            fast_mode: config.fast_mode,
        })
    }

    /// Pattern store the engine writes to
    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    /// Run one query through the pipeline.
    ///
    /// Only a failure of the first step or answer generation is returned as
    /// an error; every later collaborator failure degrades the outcome.
    pub async fn process(&self, request: ReasoningRequest) -> AppResult<ReasoningOutcome> {
        let start = Instant::now();
        let fast_mode = request.fast_mode.unwrap_or(self.fast_mode);
        let query = request.query.as_str();

        info!(
            session_id = %request.session_id,
            query_length = query.len(),
            fast_mode,
            "Reasoning started"
        );

        let mut context = self.conversation_context(&request).await;

        let mut applied_patterns = Vec::new();
        let mut pattern_ids = Vec::new();
        if !fast_mode {
            let patterns = self
                .retriever
                .retrieve(
                    query,
                    self.retrieval.n_results,
                    self.retrieval.min_quality,
                    self.retrieval.min_similarity,
                )
                .await;
            if !patterns.is_empty() {
                info!(
                    patterns = %self.formatter.summarize_ids(&patterns),
                    "Applying learned patterns"
                );
                context = context.with_pattern_guidance(self.formatter.format(&patterns));
                applied_patterns = self.formatter.applied_metadata(&patterns);
                pattern_ids = patterns.into_iter().map(|p| p.pattern_id).collect();
            }
        }

        let mut token_usage = TokenUsage::default();

        let generated = self
            .step_generator
            .generate_steps(query, &context)
            .await
            .map_err(|e| {
                error!(session_id = %request.session_id, error = %e, "Step generation failed");
                e
            })?;
        token_usage.accumulate(generated.token_usage);
        let mut reasoning_steps = generated.steps;

        let answer = self
            .step_generator
            .generate_response(query, &reasoning_steps, &context)
            .await
            .map_err(|e| {
                error!(session_id = %request.session_id, error = %e, "Response generation failed");
                e
            })?;
        token_usage.accumulate(answer.token_usage);
        let mut response = answer.text;

        let initial_quality = self.scorer.score(query, &response, &reasoning_steps).await;
        let mut quality = initial_quality;

        let mut refinement = None;
        if !fast_mode && self.refinement.should_refine(initial_quality.quality_score) {
            let result = self
                .refinement
                .refine(query, &response, &reasoning_steps, initial_quality, &context)
                .await;
            token_usage.accumulate(result.token_usage);
            refinement = Some(RefinementSummary::from(&result));
            quality = result.final_quality_result;
            response = result.response;
            reasoning_steps = result.reasoning_steps;
        }

        let breakdown = QualityBreakdown::from(&quality);
        let extracted_pattern = if PatternExtractor::should_extract(quality.quality_score) {
            self.extractor
                .extract(query, &response, quality.quality_score, Some(breakdown))
                .await
                .ok()
        } else {
            None
        };

        let pattern_stored = match &extracted_pattern {
            Some(pattern) => self.store.store(pattern).await,
            None => false,
        };

        let processing_time_seconds = start.elapsed().as_secs_f64();
        info!(
            session_id = %request.session_id,
            quality = quality.quality_score,
            steps = reasoning_steps.len(),
            refined = refinement.is_some(),
            pattern_stored,
            processing_time_seconds,
            "Reasoning completed"
        );

        Ok(ReasoningOutcome {
            response,
            reasoning_steps,
            metadata: OutcomeMetadata {
                session_id: request.session_id.clone(),
                timestamp: Utc::now(),
                processing_time_seconds,
                token_usage,
                fast_mode,
                initial_quality_score: initial_quality.quality_score,
                quality_score: quality.quality_score,
                quality_level: quality.quality_level,
                quality_breakdown: breakdown,
                patterns_retrieved: pattern_ids.len(),
                pattern_ids,
                applied_patterns,
                refinement,
                pattern_extracted: extracted_pattern.is_some(),
                pattern_id: extracted_pattern.as_ref().map(|p| p.pattern_id.clone()),
                pattern_stored,
            },
            extracted_pattern,
        })
    }

    async fn conversation_context(&self, request: &ReasoningRequest) -> GenerationContext {
        let mut context = GenerationContext::new();

        let history_text = request
            .context
            .clone()
            .or_else(|| request.history.last().map(render_turn));
        if let Some(history_text) = history_text {
            context = context.with_history(&history_text);
        }

        if request.history.is_empty() {
            return context;
        }

        let mut sections = Vec::new();
        let summary = self.preferences.extract(&request.history);
        if !summary.is_empty() {
            sections.push(self.preferences.build_context_prompt(&summary));
        }
        if ContextSynthesizer::should_synthesize(request.history.len()) {
            let synthesis = self.synthesizer.synthesize(&request.history).await;
            if !synthesis.is_empty() {
                sections.push(format!("Conversation summary: {}", synthesis));
            }
        }

        if sections.is_empty() {
            context
        } else {
            debug!(sections = sections.len(), "Preference context attached");
            context.with_preference_context(sections.join("\n\n"))
        }
    }
}

fn render_turn(turn: &ConversationTurn) -> String {
    format!("User: {}\nAssistant: {}", turn.query_text, turn.response_text)
}
