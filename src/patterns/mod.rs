//! Reusable reasoning patterns.
//!
//! A pattern is distilled from a high-quality answer by [`PatternExtractor`],
//! persisted by [`PatternStore`], ranked for new queries by
//! [`PatternRetriever`], rendered into prompts by [`PatternPromptFormatter`]
//! and credited for its effect by [`PatternUsageTracker`].

mod extractor;
mod prompt;
mod retrieval;
mod store;
mod usage;

pub use extractor::{
    apply_template, metadata_for, PatternExtractor, APPLICABILITY_METADATA_CHARS,
    EXTRACTION_THRESHOLD,
};
pub use prompt::{AppliedPattern, PatternPromptFormatter};
pub use retrieval::{
    ranking_score, PatternRetriever, RankedPattern, RankingWeights, RetrievalStats,
};
pub use store::{document_for, PatternSearchResult, PatternStore};
pub use usage::PatternUsageTracker;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractionFailure;
use crate::quality::QualityBreakdown;

/// A distilled, reusable description of a successful reasoning approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// `pattern_` plus 8 hex chars derived from type and domain.
    pub pattern_id: String,
    /// Kind of reasoning.
    pub pattern_type: String,
    /// Topic area.
    pub domain: String,
    /// Ordered recommended steps.
    pub reasoning_steps: Vec<String>,
    /// What made the source answer good.
    pub success_indicators: Vec<String>,
    /// When the pattern applies.
    pub applicability: String,
    /// Answer skeleton with `{{name}}` placeholders.
    pub template: String,
    /// Query the pattern was distilled from.
    pub source_query: String,
    /// Answer the pattern was distilled from.
    pub source_response: String,
    /// Quality of the source answer.
    pub quality_score: f64,
    /// Assessment of the source answer, when available.
    pub quality_breakdown: Option<QualityBreakdown>,
    /// Extraction time.
    pub extracted_at: DateTime<Utc>,
    /// Applications so far.
    pub usage_count: u32,
    /// Share of applications that improved quality.
    pub success_rate: f64,
}

/// The six fields the extraction model must supply, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDraft {
    /// Kind of reasoning.
    pub pattern_type: String,
    /// Topic area.
    pub domain: String,
    /// Ordered recommended steps.
    pub reasoning_steps: Vec<String>,
    /// What made the source answer good.
    pub success_indicators: Vec<String>,
    /// When the pattern applies.
    pub applicability: String,
    /// Answer skeleton.
    pub template: String,
}

impl PatternDraft {
    /// Validate a decoded JSON value.
    ///
    /// Every field must be present. Type and domain must be non-blank
    /// strings; list fields accept an array of strings or a newline
    /// separated string.
    pub fn from_json(value: &Value) -> Result<Self, ExtractionFailure> {
        let object = value.as_object().ok_or_else(|| ExtractionFailure::InvalidJson {
            message: "expected a JSON object".to_string(),
        })?;

        let field = |name: &'static str| {
            object
                .get(name)
                .ok_or(ExtractionFailure::MissingField { field: name })
        };

        // Presence is checked for every field before any shape check
        for name in [
            "pattern_type",
            "domain",
            "reasoning_steps",
            "success_indicators",
            "applicability",
            "template",
        ] {
            field(name)?;
        }

        Ok(Self {
            pattern_type: required_text("pattern_type", field("pattern_type")?)?,
            domain: required_text("domain", field("domain")?)?,
            reasoning_steps: text_list("reasoning_steps", field("reasoning_steps")?)?,
            success_indicators: text_list("success_indicators", field("success_indicators")?)?,
            applicability: text("applicability", field("applicability")?)?,
            template: text("template", field("template")?)?,
        })
    }

    /// Identifier this draft will be stored under
    pub fn pattern_id(&self) -> String {
        pattern_id(&self.pattern_type, &self.domain)
    }
}

/// Deterministic identifier for a (type, domain) pair.
pub fn pattern_id(pattern_type: &str, domain: &str) -> String {
    let digest = Md5::digest(format!("{}_{}", pattern_type, domain).as_bytes());
    let hex = hex::encode(digest);
    format!("pattern_{}", &hex[..8])
}

fn text(name: &'static str, value: &Value) -> Result<String, ExtractionFailure> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| ExtractionFailure::MalformedField {
            field: name,
            reason: "expected a string".to_string(),
        })
}

fn required_text(name: &'static str, value: &Value) -> Result<String, ExtractionFailure> {
    let s = text(name, value)?;
    if s.is_empty() {
        return Err(ExtractionFailure::MalformedField {
            field: name,
            reason: "must not be blank".to_string(),
        });
    }
    Ok(s)
}

fn text_list(name: &'static str, value: &Value) -> Result<Vec<String>, ExtractionFailure> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| ExtractionFailure::MalformedField {
                        field: name,
                        reason: "expected an array of strings".to_string(),
                    })
            })
            .collect(),
        Value::String(s) => Ok(s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        _ => Err(ExtractionFailure::MalformedField {
            field: name,
            reason: "expected an array of strings".to_string(),
        }),
    }
}
