use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::rules::{score_coherence, score_completeness, score_relevance};
use super::{LlmBasedScores, QualityResult, RuleBasedScores, Scorer};
use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts::quality_verification_prompt;
use crate::reasoning::ReasoningStep;

/// Sub-score substituted when the grader reply is missing or unusable.
pub const LLM_FALLBACK_SCORE: f64 = 0.7;

const GRADER_TEMPERATURE: f64 = 0.3;
const GRADER_MAX_TOKENS: u32 = 100;

static JSON_OBJECT: OnceLock<Option<Regex>> = OnceLock::new();

fn json_object() -> Option<&'static Regex> {
    JSON_OBJECT
        .get_or_init(|| Regex::new(r"\{[^{}]*\}").ok())
        .as_ref()
}

/// Scores (query, response, steps) triples.
#[derive(Clone)]
pub struct QualityScorer {
    generator: Arc<dyn TextGenerator>,
}

impl QualityScorer {
    /// Create a scorer that grades through the given generator
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Score an answer. Always returns a result.
    pub async fn score(
        &self,
        query: &str,
        response: &str,
        reasoning_steps: &[ReasoningStep],
    ) -> QualityResult {
        let rule_based = Self::rule_based(query, response, reasoning_steps);
        let llm_based = self.llm_based(query, response).await;
        let result = QualityResult::combine(rule_based, llm_based);

        debug!(
            quality = result.quality_score,
            level = %result.quality_level,
            rule_total = result.rule_based.total,
            llm_total = result.llm_based.total,
            "Quality scored"
        );

        result
    }

    /// Heuristic half of the score
    pub fn rule_based(
        query: &str,
        response: &str,
        reasoning_steps: &[ReasoningStep],
    ) -> RuleBasedScores {
        RuleBasedScores::new(
            score_completeness(response),
            score_coherence(reasoning_steps),
            score_relevance(query, response),
        )
    }

    async fn llm_based(&self, query: &str, response: &str) -> LlmBasedScores {
        let request = GenerationRequest::new(quality_verification_prompt(query, response))
            .with_temperature(GRADER_TEMPERATURE)
            .with_max_tokens(GRADER_MAX_TOKENS);

        match self.generator.generate(request).await {
            Ok(generation) => parse_grader_reply(&generation.text).unwrap_or_else(|| {
                warn!(
                    reply_length = generation.text.len(),
                    "Grader reply unparsable, using neutral scores"
                );
                LlmBasedScores::neutral()
            }),
            Err(e) => {
                warn!(error = %e, "Grader call failed, using neutral scores");
                LlmBasedScores::neutral()
            }
        }
    }
}

#[async_trait]
impl Scorer for QualityScorer {
    async fn score(
        &self,
        query: &str,
        response: &str,
        reasoning_steps: &[ReasoningStep],
    ) -> QualityResult {
        QualityScorer::score(self, query, response, reasoning_steps).await
    }
}

/// Parse the first flat JSON object in a grader reply.
///
/// Missing or non-numeric keys take the fallback score; values are clamped.
pub fn parse_grader_reply(text: &str) -> Option<LlmBasedScores> {
    let candidate = json_object()?.find(text)?;
    let value: Value = serde_json::from_str(candidate.as_str()).ok()?;
    let object = value.as_object()?;

    let read = |key: &str| {
        object
            .get(key)
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(LLM_FALLBACK_SCORE)
    };

    Some(LlmBasedScores::new(
        read("correctness"),
        read("completeness"),
        read("clarity"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Generation, MockTextGenerator};
    use crate::quality::QualityLevel;

    #[test]
    fn test_json_object_pattern_compiles() {
        assert!(json_object().is_some());
    }

    fn steps() -> Vec<ReasoningStep> {
        vec![
            ReasoningStep::new(1, "Identify the country in question"),
            ReasoningStep::new(2, "Recall its capital city"),
        ]
    }

    fn scorer_replying(reply: &'static str) -> QualityScorer {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .times(1)
            .returning(move |_| Ok(Generation::from_text(reply)));
        QualityScorer::new(Arc::new(mock))
    }

    #[test]
    fn test_parse_grader_reply_with_surrounding_text() {
        let scores = parse_grader_reply(
            "Sure! {\"correctness\": 0.9, \"completeness\": 0.8, \"clarity\": 1.0} Hope that helps.",
        )
        .unwrap();
        assert_eq!(scores.correctness, 0.9);
        assert_eq!(scores.completeness, 0.8);
        assert_eq!(scores.clarity, 1.0);
        assert_eq!(scores.total, 0.9);
    }

    #[test]
    fn test_parse_grader_reply_missing_keys_and_clamp() {
        let scores = parse_grader_reply(r#"{"correctness": 1.7, "clarity": "0.4"}"#).unwrap();
        assert_eq!(scores.correctness, 1.0);
        assert_eq!(scores.completeness, LLM_FALLBACK_SCORE);
        assert_eq!(scores.clarity, 0.4);
    }

    #[test]
    fn test_parse_grader_reply_rejects_garbage() {
        assert!(parse_grader_reply("no json here").is_none());
        assert!(parse_grader_reply("{not valid}").is_none());
    }

    #[tokio::test]
    async fn test_score_blends_rule_and_llm() {
        let scorer = scorer_replying(r#"{"correctness": 1.0, "completeness": 1.0, "clarity": 1.0}"#);
        let result = scorer
            .score(
                "Capital of France?",
                "The capital of France is Paris, which is also its largest city by population.",
                &steps(),
            )
            .await;

        assert_eq!(result.rule_based.completeness, 0.8);
        assert_eq!(result.rule_based.coherence, 1.0);
        assert_eq!(result.rule_based.relevance, 1.0);
        assert_eq!(result.llm_based.total, 1.0);
        let expected = ((0.4 * result.rule_based.total + 0.6) * 1000.0).round() / 1000.0;
        assert_eq!(result.quality_score, expected);
        assert_eq!(result.quality_level, QualityLevel::Excellent);
    }

    #[tokio::test]
    async fn test_score_falls_back_on_generation_error() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Err(LlmError::Timeout { timeout_ms: 10 }));
        let scorer = QualityScorer::new(Arc::new(mock));

        let result = scorer.score("ab", "", &[]).await;
        assert_eq!(result.llm_based, LlmBasedScores::neutral());
        assert_eq!(result.rule_based.relevance, 0.5);
        assert!((0.0..=1.0).contains(&result.quality_score));
    }

    #[tokio::test]
    async fn test_score_falls_back_on_unparsable_reply() {
        let scorer = scorer_replying("I think it is pretty good.");
        let result = scorer.score("Tell me stuff", "Some stuff.", &steps()).await;
        assert_eq!(result.llm_based.total, LLM_FALLBACK_SCORE);
        assert_eq!(result.rule_based.relevance, 0.4);
    }

    #[tokio::test]
    async fn test_grader_request_parameters() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .withf(|request| {
                request.temperature == Some(0.3)
                    && request.max_tokens == Some(100)
                    && request.prompt.contains("quality assessor")
            })
            .times(1)
            .returning(|_| Ok(Generation::from_text("{}")));
        let scorer = QualityScorer::new(Arc::new(mock));

        let result = scorer.score("q", "r", &[]).await;
        assert_eq!(result.llm_based, LlmBasedScores::neutral());
    }
}
