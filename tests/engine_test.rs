//! End-to-end tests for the reasoning engine
//!
//! Wires the real step generator, scorer, extractor and SQLite pattern index
//! to a scripted text generator that answers by prompt kind.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use adaptive_reasoning::config::Config;
use adaptive_reasoning::error::{AppError, LlmError, LlmResult};
use adaptive_reasoning::llm::{Generation, GenerationRequest, TextGenerator, TokenUsage};
use adaptive_reasoning::patterns::PatternUsageTracker;
use adaptive_reasoning::reasoning::{
    ConversationTurn, ConvergenceReason, ReasoningEngine, ReasoningRequest,
};
use adaptive_reasoning::storage::SqliteStorage;

const STEPS: &str = "1. Identify the country in question\n\
                     2. Recall the capital city of that country\n\
                     3. State the answer clearly";

const GOOD_ANSWER: &str = "The capital city of France is Paris. Paris has been the capital \
                           of France for centuries and is also its largest city.";

const PATTERN_JSON: &str = r#"{
    "pattern_type": "factual_lookup",
    "domain": "geography",
    "reasoning_steps": ["Identify the country", "Recall its capital city"],
    "success_indicators": ["Names the capital directly"],
    "applicability": "Questions asking for the capital city of a country",
    "template": "The capital of {{country}} is {{capital}}."
}"#;

/// Answers by prompt kind and records every prompt it sees.
struct ScriptedGenerator {
    answer: &'static str,
    grade: Option<f64>,
    steps_available: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(answer: &'static str, grade: Option<f64>) -> Self {
        Self {
            answer,
            grade,
            steps_available: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing_steps() -> Self {
        Self {
            steps_available: false,
            ..Self::new(GOOD_ANSWER, Some(0.95))
        }
    }

    fn prompts_containing(&self, marker: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(marker))
            .cloned()
            .collect()
    }

    fn reply(&self, prompt: &str) -> LlmResult<String> {
        if prompt.contains("You are a quality assessor") {
            return match self.grade {
                Some(g) => Ok(format!(
                    r#"{{"correctness": {g}, "completeness": {g}, "clarity": {g}}}"#
                )),
                None => Err(unavailable()),
            };
        }
        if prompt.contains("expert at identifying reasoning patterns") {
            return Ok(format!("Here is the pattern:\n{}", PATTERN_JSON));
        }
        if prompt.contains("Review the following conversation") {
            return Ok("The user enjoys outdoor travel in the mountains.".to_string());
        }
        if prompt.contains("Based on the following reasoning steps") {
            return Ok(self.answer.to_string());
        }
        if self.steps_available {
            Ok(STEPS.to_string())
        } else {
            Err(unavailable())
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> LlmResult<Generation> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let text = self.reply(&request.prompt)?;
        Ok(Generation {
            text,
            token_usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
            },
        })
    }
}

fn unavailable() -> LlmError {
    LlmError::Unavailable {
        message: "scripted outage".to_string(),
        retries: 1,
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.retrieval.min_similarity = 0.0;
    config
}

async fn setup(generator: Arc<ScriptedGenerator>) -> (Arc<SqliteStorage>, ReasoningEngine) {
    let storage = Arc::new(
        SqliteStorage::new_in_memory()
            .await
            .expect("Failed to create in-memory storage"),
    );
    let engine = ReasoningEngine::new(&test_config(), generator, storage.clone())
        .expect("Failed to create engine");
    (storage, engine)
}

#[cfg(test)]
mod learning_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_good_answer_is_learned_and_reused() {
        let generator = Arc::new(ScriptedGenerator::new(GOOD_ANSWER, Some(0.95)));
        let (storage, engine) = setup(generator.clone()).await;

        let first = engine
            .process(ReasoningRequest::new("What is the capital city of France?"))
            .await
            .unwrap();

        assert_eq!(first.response, GOOD_ANSWER);
        assert_eq!(first.reasoning_steps.len(), 3);
        assert!(first.metadata.quality_score >= 0.8);
        assert_eq!(first.metadata.patterns_retrieved, 0);
        assert!(first.metadata.refinement.is_none());
        assert!(first.metadata.pattern_extracted);
        assert!(first.metadata.pattern_stored);
        assert_eq!(first.metadata.pattern_id.as_deref(), Some("pattern_d42f6c54"));
        assert!(generator.prompts_containing("=== LEARNED PATTERNS ===").is_empty());

        let second = engine
            .process(ReasoningRequest::new("What is the capital city of Germany?"))
            .await
            .unwrap();

        assert_eq!(second.metadata.patterns_retrieved, 1);
        assert_eq!(second.metadata.pattern_ids, vec!["pattern_d42f6c54"]);
        assert_eq!(second.metadata.applied_patterns.len(), 1);
        assert_eq!(second.metadata.applied_patterns[0].domain, "geography");

        let guided = generator.prompts_containing("=== LEARNED PATTERNS ===");
        assert_eq!(guided.len(), 1);
        assert!(guided[0].contains("Break down the following query"));
        assert!(guided[0].contains("Identify the country"));

        // Same type and domain maps onto the same stored pattern
        assert_eq!(engine.store().get_count().await, 1);

        let tracker = PatternUsageTracker::new(storage, engine.store().clone());
        let recorded = tracker
            .record_usage(
                &second.metadata.session_id,
                &second.metadata.applied_patterns,
                Some(second.metadata.initial_quality_score),
                Some(second.metadata.quality_score),
            )
            .await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(tracker.usage_stats("pattern_d42f6c54").await.usage_count, 1);
    }

    #[tokio::test]
    async fn test_token_usage_covers_every_call() {
        let generator = Arc::new(ScriptedGenerator::new(GOOD_ANSWER, Some(0.95)));
        let (_, engine) = setup(generator).await;

        let outcome = engine
            .process(ReasoningRequest::new("What is the capital city of France?"))
            .await
            .unwrap();

        // Steps and answer only; grading and extraction are not billed to the answer
        assert_eq!(outcome.metadata.token_usage.total(), 40);
    }
}

#[cfg(test)]
mod refinement_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_poor_answer_is_refined_until_plateau() {
        let generator = Arc::new(ScriptedGenerator::new("No.", Some(0.2)));
        let (storage, engine) = setup(generator.clone()).await;

        let outcome = engine
            .process(ReasoningRequest::new("What is the capital city of France?"))
            .await
            .unwrap();

        let refinement = outcome.metadata.refinement.as_ref().unwrap();
        assert_eq!(refinement.iterations, 2);
        assert_eq!(refinement.convergence_reason, ConvergenceReason::PlateauDetected);
        assert_eq!(
            refinement.quality_progression[0],
            refinement.quality_progression[1]
        );
        assert!(outcome.metadata.quality_score < 0.8);
        assert!(!outcome.metadata.pattern_extracted);
        assert!(!outcome.metadata.pattern_stored);

        let refined = generator.prompts_containing("=== REFINEMENT ITERATION 2 ===");
        assert_eq!(refined.len(), 2, "steps and answer prompts both carry the critique");
        assert!(generator
            .prompts_containing("expert at identifying reasoning patterns")
            .is_empty());
        assert_eq!(storage_count(&storage).await, 0);
    }

    async fn storage_count(storage: &SqliteStorage) -> usize {
        use adaptive_reasoning::storage::PatternIndex;
        storage.count().await.unwrap()
    }
}

#[cfg(test)]
mod fallback_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_grader_outage_uses_neutral_scores() {
        let generator = Arc::new(ScriptedGenerator::new(GOOD_ANSWER, None));
        let (_, engine) = setup(generator).await;

        let outcome = engine
            .process(
                ReasoningRequest::new("What is the capital city of France?").with_fast_mode(true),
            )
            .await
            .unwrap();

        let llm_based = outcome.metadata.quality_breakdown.llm_based;
        assert_eq!(llm_based.correctness, 0.7);
        assert_eq!(llm_based.completeness, 0.7);
        assert_eq!(llm_based.clarity, 0.7);
        assert!(outcome.metadata.fast_mode);
        assert!(outcome.metadata.refinement.is_none());
    }

    #[tokio::test]
    async fn test_step_generation_failure_is_an_error() {
        let generator = Arc::new(ScriptedGenerator::failing_steps());
        let (_, engine) = setup(generator).await;

        let result = engine
            .process(ReasoningRequest::new("What is the capital city of France?"))
            .await;

        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_history_feeds_preferences_and_summary() {
        let generator = Arc::new(ScriptedGenerator::new(GOOD_ANSWER, Some(0.95)));
        let (_, engine) = setup(generator.clone()).await;

        let history = vec![
            ConversationTurn::new("I like hiking", "Great, hiking is fun."),
            ConversationTurn::new("I prefer mountains", "Mountains it is."),
            ConversationTurn::new("Any tips for Europe?", "The Alps are lovely."),
        ];
        engine
            .process(
                ReasoningRequest::new("Suggest a weekend trip for me")
                    .with_history(history)
                    .with_fast_mode(true),
            )
            .await
            .unwrap();

        assert_eq!(
            generator
                .prompts_containing("Review the following conversation")
                .len(),
            1
        );

        let steps = generator.prompts_containing("Break down the following query");
        assert_eq!(steps.len(), 1);
        assert!(steps[0].contains("=== USER PREFERENCES (CUMULATIVE) ==="));
        assert!(steps[0].contains("hiking"));
        assert!(steps[0].contains("Conversation summary: The user enjoys outdoor travel"));
        assert!(steps[0].contains("Any tips for Europe?"));
    }

    #[tokio::test]
    async fn test_explicit_context_overrides_history_rendering() {
        let generator = Arc::new(ScriptedGenerator::new(GOOD_ANSWER, Some(0.95)));
        let (_, engine) = setup(generator.clone()).await;

        engine
            .process(
                ReasoningRequest::new("What is the capital city of France?")
                    .with_history(vec![ConversationTurn::new("Earlier question", "Earlier answer")])
                    .with_context("Caller supplied context")
                    .with_fast_mode(true),
            )
            .await
            .unwrap();

        let steps = generator.prompts_containing("Break down the following query");
        assert!(steps[0].contains("Caller supplied context"));
        assert!(!steps[0].contains("Earlier answer"));
        assert!(generator
            .prompts_containing("Review the following conversation")
            .is_empty());
    }
}
