//! Rendering retrieved patterns as prompt guidance.

use serde::{Deserialize, Serialize};

use super::RankedPattern;

const MAX_PATTERNS: usize = 3;
const MAX_STEPS: usize = 5;
const MAX_INDICATORS: usize = 3;
const MAX_APPLICABILITY_CHARS: usize = 150;
const MAX_SUMMARY_IDS: usize = 5;

/// Minimal record of a pattern applied to a query, kept for usage tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedPattern {
    /// Stored identifier.
    pub pattern_id: String,
    /// Similarity to the query it was applied to.
    pub similarity: f64,
    /// Quality of the pattern's source answer.
    pub quality_score: f64,
    /// Topic area.
    pub domain: String,
    /// Kind of reasoning.
    pub pattern_type: String,
}

/// Formats ranked patterns for injection into generation prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternPromptFormatter;

impl PatternPromptFormatter {
    /// Create a formatter
    pub fn new() -> Self {
        Self
    }

    /// Guidance block for the top patterns, empty when there are none.
    pub fn format(&self, patterns: &[RankedPattern]) -> String {
        if patterns.is_empty() {
            return String::new();
        }

        let mut parts = vec![
            "=== LEARNED PATTERNS ===".to_string(),
            "The following patterns have been learned from previous successful reasoning. \
             Use them to guide your approach:\n"
                .to_string(),
        ];
        parts.extend(
            patterns
                .iter()
                .take(MAX_PATTERNS)
                .enumerate()
                .map(|(i, pattern)| format_single(pattern, i + 1)),
        );
        parts.push("=== END PATTERNS ===\n".to_string());
        parts.join("\n")
    }

    /// Comma-separated ids for logging, at most five.
    pub fn summarize_ids(&self, patterns: &[RankedPattern]) -> String {
        if patterns.is_empty() {
            return "none".to_string();
        }
        patterns
            .iter()
            .take(MAX_SUMMARY_IDS)
            .map(|p| p.pattern_id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Usage-tracking records for the given patterns
    pub fn applied_metadata(&self, patterns: &[RankedPattern]) -> Vec<AppliedPattern> {
        patterns
            .iter()
            .map(|p| AppliedPattern {
                pattern_id: p.pattern_id.clone(),
                similarity: p.similarity_score,
                quality_score: p.metadata.quality_score,
                domain: p.metadata.domain.clone(),
                pattern_type: p.metadata.pattern_type.clone(),
            })
            .collect()
    }
}

fn format_single(pattern: &RankedPattern, index: usize) -> String {
    let metadata = &pattern.metadata;
    let mut parts = vec![
        format!("\n--- Pattern {} ---", index),
        format!("Type: {} | Domain: {}", metadata.pattern_type, metadata.domain),
        format!(
            "Quality: {:.2} | Relevance: {:.2}",
            metadata.quality_score, pattern.similarity_score
        ),
    ];

    if !metadata.reasoning_steps.is_empty() {
        parts.push("\nRecommended Approach:".to_string());
        parts.extend(
            metadata
                .reasoning_steps
                .iter()
                .take(MAX_STEPS)
                .enumerate()
                .map(|(i, step)| format!("  {}. {}", i + 1, step)),
        );
    }

    if !metadata.success_indicators.is_empty() {
        parts.push("\nSuccess Indicators:".to_string());
        parts.extend(
            metadata
                .success_indicators
                .iter()
                .take(MAX_INDICATORS)
                .map(|indicator| format!("  • {}", indicator)),
        );
    }

    let applicability = metadata.applicability.trim();
    if !applicability.is_empty() && applicability.chars().count() <= MAX_APPLICABILITY_CHARS {
        parts.push(format!("\nWhen to use: {}", applicability));
    }

    parts.join("\n")
}
