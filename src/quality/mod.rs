//! Answer quality measurement.
//!
//! A score blends cheap rule-based signals (40%) with a model-graded
//! assessment (60%). Scoring never fails: an unusable grader reply falls
//! back to neutral sub-scores.

pub mod rules;
mod scorer;

pub use scorer::{parse_grader_reply, QualityScorer, LLM_FALLBACK_SCORE};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::reasoning::ReasoningStep;

/// Weight of the rule-based total in the final score.
pub const RULE_WEIGHT: f64 = 0.4;
/// Weight of the model-graded total in the final score.
pub const LLM_WEIGHT: f64 = 0.6;

/// Coarse bucket derived from the numeric quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    /// Below 0.7.
    Poor,
    /// From 0.7 up to 0.8.
    Acceptable,
    /// From 0.8 up to 0.9.
    Good,
    /// 0.9 and above.
    Excellent,
}

impl QualityLevel {
    /// Bucket a score.
    pub fn from_score(score: f64) -> Self {
        if score < 0.7 {
            QualityLevel::Poor
        } else if score < 0.8 {
            QualityLevel::Acceptable
        } else if score < 0.9 {
            QualityLevel::Good
        } else {
            QualityLevel::Excellent
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityLevel::Poor => write!(f, "poor"),
            QualityLevel::Acceptable => write!(f, "acceptable"),
            QualityLevel::Good => write!(f, "good"),
            QualityLevel::Excellent => write!(f, "excellent"),
        }
    }
}

/// Heuristic sub-scores computed without the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleBasedScores {
    /// Length-based completeness.
    pub completeness: f64,
    /// Structural coherence of the reasoning steps.
    pub coherence: f64,
    /// Keyword overlap between query and response.
    pub relevance: f64,
    /// Mean of the three.
    pub total: f64,
}

impl RuleBasedScores {
    /// Build from the three sub-scores, rounding each and the mean.
    pub fn new(completeness: f64, coherence: f64, relevance: f64) -> Self {
        Self {
            completeness: round3(completeness),
            coherence: round3(coherence),
            relevance: round3(relevance),
            total: round3((completeness + coherence + relevance) / 3.0),
        }
    }
}

/// Sub-scores assigned by the grader model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LlmBasedScores {
    /// Factual accuracy.
    pub correctness: f64,
    /// Coverage of the question.
    pub completeness: f64,
    /// Readability and structure.
    pub clarity: f64,
    /// Mean of the three.
    pub total: f64,
}

impl LlmBasedScores {
    /// Build from the three sub-scores, clamping each to [0, 1].
    pub fn new(correctness: f64, completeness: f64, clarity: f64) -> Self {
        let correctness = clamp_unit(correctness);
        let completeness = clamp_unit(completeness);
        let clarity = clamp_unit(clarity);
        Self {
            correctness: round3(correctness),
            completeness: round3(completeness),
            clarity: round3(clarity),
            total: round3((correctness + completeness + clarity) / 3.0),
        }
    }

    /// Neutral scores used when the grader cannot be consulted.
    pub fn neutral() -> Self {
        Self::new(LLM_FALLBACK_SCORE, LLM_FALLBACK_SCORE, LLM_FALLBACK_SCORE)
    }
}

/// Full quality assessment of one answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    /// Weighted blend in [0, 1], rounded to 3 decimals.
    pub quality_score: f64,
    /// Bucket of `quality_score`.
    pub quality_level: QualityLevel,
    /// Heuristic half.
    pub rule_based: RuleBasedScores,
    /// Model-graded half.
    pub llm_based: LlmBasedScores,
}

impl QualityResult {
    /// Combine both halves into a final score and level.
    pub fn combine(rule_based: RuleBasedScores, llm_based: LlmBasedScores) -> Self {
        let quality_score =
            clamp_unit(round3(RULE_WEIGHT * rule_based.total + LLM_WEIGHT * llm_based.total));
        Self {
            quality_score,
            quality_level: QualityLevel::from_score(quality_score),
            rule_based,
            llm_based,
        }
    }
}

/// The two halves of an assessment, without the blended score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    /// Heuristic half.
    pub rule_based: RuleBasedScores,
    /// Model-graded half.
    pub llm_based: LlmBasedScores,
}

impl From<&QualityResult> for QualityBreakdown {
    fn from(result: &QualityResult) -> Self {
        Self {
            rule_based: result.rule_based,
            llm_based: result.llm_based,
        }
    }
}

/// Anything that can assess an answer.
///
/// Implementations must not fail; degraded inputs produce degraded scores.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Assess one (query, response, steps) triple.
    async fn score(
        &self,
        query: &str,
        response: &str,
        reasoning_steps: &[ReasoningStep],
    ) -> QualityResult;
}

/// Round to three decimal places.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(QualityLevel::from_score(0.0), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.699), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.7), QualityLevel::Acceptable);
        assert_eq!(QualityLevel::from_score(0.8), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.899), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.9), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(1.0), QualityLevel::Excellent);
    }

    #[test]
    fn test_level_serializes_snake_case() {
        let json = serde_json::to_string(&QualityLevel::Acceptable).unwrap();
        assert_eq!(json, "\"acceptable\"");
        assert_eq!(QualityLevel::Excellent.to_string(), "excellent");
    }

    #[test]
    fn test_combine_weights() {
        let rule = RuleBasedScores::new(1.0, 1.0, 1.0);
        let llm = LlmBasedScores::new(0.5, 0.5, 0.5);
        let result = QualityResult::combine(rule, llm);
        assert_eq!(result.quality_score, 0.7);
        assert_eq!(result.quality_level, QualityLevel::Acceptable);
    }

    #[test]
    fn test_combine_rounds_to_three_places() {
        let rule = RuleBasedScores::new(0.8, 1.0, 0.6);
        let llm = LlmBasedScores::new(0.9, 0.8, 0.85);
        let result = QualityResult::combine(rule, llm);
        let expected = round3(0.4 * rule.total + 0.6 * llm.total);
        assert_eq!(result.quality_score, expected);
        assert_eq!(result.quality_score, round3(result.quality_score));
    }

    #[test]
    fn test_llm_scores_clamped() {
        let llm = LlmBasedScores::new(1.5, -0.2, f64::NAN);
        assert_eq!(llm.correctness, 1.0);
        assert_eq!(llm.completeness, 0.0);
        assert_eq!(llm.clarity, 0.0);
        assert_eq!(llm.total, 0.333);
    }

    #[test]
    fn test_neutral_llm_scores() {
        let llm = LlmBasedScores::neutral();
        assert_eq!(llm.correctness, 0.7);
        assert_eq!(llm.total, 0.7);
    }
}
