//! Rule-based quality signals.
//!
//! These are pure functions of the query, the response and the parsed
//! reasoning steps; they never call the generation service.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::reasoning::ReasoningStep;

/// Words that carry no subject on their own.
pub const VAGUE_TERMS: [&str; 8] = [
    "what", "tell", "stuff", "thing", "something", "anything", "how", "why",
];

/// Markers of a reasoning chain that corrects itself mid-way.
pub const CONTRADICTION_MARKERS: [&str; 5] = ["no wait", "actually", "correction", "wrong", "mistake"];

/// Relevance returned for queries made only of vague filler.
pub const VAGUE_QUERY_RELEVANCE: f64 = 0.4;

/// Relevance returned when the query has no substantial words to compare.
pub const NEUTRAL_RELEVANCE: f64 = 0.5;

/// Coherence returned when there are no steps to judge.
pub const NEUTRAL_COHERENCE: f64 = 0.5;

static SUBSTANTIAL_WORD: OnceLock<Option<Regex>> = OnceLock::new();

fn substantial_word() -> Option<&'static Regex> {
    SUBSTANTIAL_WORD
        .get_or_init(|| Regex::new(r"\b\w{4,}\b").ok())
        .as_ref()
}

/// Score response completeness as a step function of trimmed length.
pub fn score_completeness(response: &str) -> f64 {
    match response.trim().chars().count() {
        0..=9 => 0.2,
        10..=29 => 0.5,
        30..=99 => 0.8,
        _ => 1.0,
    }
}

/// The three independent checks behind the coherence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoherenceFlags {
    /// Step numbers run 1, 2, 3, ... without gaps
    pub is_sequential: bool,
    /// Every step has a non-blank description
    pub all_described: bool,
    /// No contradiction marker appears in the descriptions
    pub no_contradictions: bool,
}

impl CoherenceFlags {
    /// Evaluate the flags for a list of steps
    pub fn evaluate(steps: &[ReasoningStep]) -> Self {
        let is_sequential = steps
            .iter()
            .enumerate()
            .all(|(i, step)| step.step_number == i + 1);

        let all_described = steps.iter().all(|step| !step.description.trim().is_empty());

        let joined = steps
            .iter()
            .map(|step| step.description.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let no_contradictions = !CONTRADICTION_MARKERS
            .iter()
            .any(|marker| joined.contains(marker));

        Self {
            is_sequential,
            all_described,
            no_contradictions,
        }
    }

    /// 0.4 for sequence, 0.4 for descriptions, 0.2 for no contradictions
    pub fn score(&self) -> f64 {
        let mut score = 0.0;
        if self.is_sequential {
            score += 0.4;
        }
        if self.all_described {
            score += 0.4;
        }
        if self.no_contradictions {
            score += 0.2;
        }
        score
    }
}

/// Score the logical coherence of the reasoning steps.
pub fn score_coherence(steps: &[ReasoningStep]) -> f64 {
    if steps.is_empty() {
        return NEUTRAL_COHERENCE;
    }
    CoherenceFlags::evaluate(steps).score()
}

/// Score how well the response addresses the query.
pub fn score_relevance(query: &str, response: &str) -> f64 {
    let query_lower = query.to_lowercase();

    if is_vague_query(query, &query_lower) {
        return VAGUE_QUERY_RELEVANCE;
    }

    let query_words = substantial_words(&query_lower);
    if query_words.is_empty() {
        return NEUTRAL_RELEVANCE;
    }

    let response_lower = response.to_lowercase();
    let response_words = substantial_words(&response_lower);

    let overlap = query_words.intersection(&response_words).count();
    let relevance = overlap as f64 / query_words.len() as f64;

    (relevance * 1.2).clamp(0.3, 1.0)
}

/// A short query built only from stoplist words and short filler.
fn is_vague_query(query: &str, query_lower: &str) -> bool {
    if query.trim().chars().count() >= 15 {
        return false;
    }

    let cleaned: String = query_lower
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let terms: Vec<&str> = cleaned.split_whitespace().collect();

    let has_vague_term = terms.iter().any(|t| VAGUE_TERMS.contains(t));
    let has_subject = terms
        .iter()
        .any(|t| !VAGUE_TERMS.contains(t) && t.chars().count() > 2);

    has_vague_term && !has_subject
}

fn substantial_words(text: &str) -> HashSet<&str> {
    substantial_word()
        .map(|re| re.find_iter(text).map(|m| m.as_str()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substantial_word_pattern_compiles() {
        assert!(substantial_word().is_some());
    }

    fn step(n: usize, description: &str) -> ReasoningStep {
        ReasoningStep::new(n, description)
    }

    #[test]
    fn test_completeness_boundaries() {
        assert_eq!(score_completeness(""), 0.2);
        assert_eq!(score_completeness("123456789"), 0.2);
        assert_eq!(score_completeness("1234567890"), 0.5);
        assert_eq!(score_completeness(&"a".repeat(29)), 0.5);
        assert_eq!(score_completeness(&"a".repeat(30)), 0.8);
        assert_eq!(score_completeness(&"a".repeat(99)), 0.8);
        assert_eq!(score_completeness(&"a".repeat(100)), 1.0);
    }

    #[test]
    fn test_completeness_ignores_surrounding_whitespace() {
        assert_eq!(score_completeness("   short    "), 0.2);
    }

    #[test]
    fn test_coherence_all_flags() {
        let steps = vec![step(1, "Identify the subject"), step(2, "Recall facts")];
        let flags = CoherenceFlags::evaluate(&steps);
        assert!(flags.is_sequential);
        assert!(flags.all_described);
        assert!(flags.no_contradictions);
        assert!((score_coherence(&steps) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_coherence_flags_are_independent() {
        let out_of_order = vec![step(2, "first"), step(1, "second")];
        assert!((score_coherence(&out_of_order) - 0.6).abs() < 1e-9);

        let gap = vec![step(1, "first"), step(3, "third")];
        assert!(!CoherenceFlags::evaluate(&gap).is_sequential);

        let blank = vec![step(1, "first"), step(2, "   ")];
        assert!((score_coherence(&blank) - 0.6).abs() < 1e-9);

        let contradiction = vec![step(1, "Paris is the capital"), step(2, "Actually, Lyon")];
        assert!((score_coherence(&contradiction) - 0.8).abs() < 1e-9);

        let everything_wrong = vec![step(3, ""), step(1, "No wait")];
        assert!((score_coherence(&everything_wrong) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_coherence_empty_is_neutral() {
        assert_eq!(score_coherence(&[]), NEUTRAL_COHERENCE);
    }

    #[test]
    fn test_relevance_vague_query_penalty() {
        assert_eq!(score_relevance("Tell me stuff", "Anything at all about stuff"), 0.4);
        assert_eq!(score_relevance("What?", "A long and detailed answer"), 0.4);
        assert_eq!(score_relevance("how why", ""), 0.4);
    }

    #[test]
    fn test_relevance_short_query_without_words() {
        assert_eq!(score_relevance("ab", "anything"), 0.5);
        assert_eq!(score_relevance("", "anything"), 0.5);
        assert_eq!(score_relevance("2+2?", "four"), 0.5);
    }

    #[test]
    fn test_relevance_short_query_with_subject_not_penalized() {
        // "rust" is a subject, so no vague penalty even though the query is short;
        // query words: what, rust -> 1 of 2 overlap -> 0.5 * 1.2
        let score = score_relevance("What is rust", "Rust is a language");
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_relevance_overlap_scaled_and_clamped() {
        // query words: what, capital, france -> 1 of 3 overlap -> 0.4
        let score = score_relevance(
            "What is the capital of France",
            "The capital city is well known",
        );
        assert!((score - 0.4).abs() < 1e-9);

        // no overlap clamps to the 0.3 floor
        let score = score_relevance("Explain photosynthesis process", "Bananas are yellow");
        assert!((score - 0.3).abs() < 1e-9);

        // full overlap clamps to 1.0
        let score = score_relevance("capital france", "France capital");
        assert!((score - 1.0).abs() < 1e-9);
    }
}
