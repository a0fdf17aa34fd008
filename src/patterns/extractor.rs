//! Distilling high-quality answers into patterns.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use super::{Pattern, PatternDraft};
use crate::error::ExtractionFailure;
use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts::pattern_extraction_prompt;
use crate::quality::QualityBreakdown;
use crate::storage::PatternMetadata;

/// Minimum quality an answer needs before a pattern is distilled from it.
pub const EXTRACTION_THRESHOLD: f64 = 0.8;

/// Applicability text kept in index metadata.
pub const APPLICABILITY_METADATA_CHARS: usize = 500;

const EXTRACTION_TEMPERATURE: f64 = 0.3;
const EXTRACTION_MAX_TOKENS: u32 = 1000;
const PREVIEW_CHARS: usize = 200;

/// Turns a (query, answer, quality) triple into a [`Pattern`].
#[derive(Clone)]
pub struct PatternExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl PatternExtractor {
    /// Create an extractor over the given service
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Whether `quality` clears the extraction threshold
    pub fn should_extract(quality: f64) -> bool {
        quality >= EXTRACTION_THRESHOLD
    }

    /// Distill a pattern.
    ///
    /// Every failure is returned as an [`ExtractionFailure`] and logged with
    /// its reason; callers treat it as "no pattern".
    pub async fn extract(
        &self,
        query: &str,
        response: &str,
        quality: f64,
        breakdown: Option<QualityBreakdown>,
    ) -> Result<Pattern, ExtractionFailure> {
        let result = self.try_extract(query, response, quality, breakdown).await;
        match &result {
            Ok(pattern) => info!(
                pattern_id = %pattern.pattern_id,
                pattern_type = %pattern.pattern_type,
                domain = %pattern.domain,
                "Pattern extracted"
            ),
            Err(failure @ ExtractionFailure::BelowThreshold { .. }) => info!(
                quality,
                threshold = EXTRACTION_THRESHOLD,
                reason = failure.reason(),
                "Pattern extraction skipped"
            ),
            Err(failure) => warn!(
                reason = failure.reason(),
                error = %failure,
                "Pattern extraction rejected"
            ),
        }
        result
    }

    async fn try_extract(
        &self,
        query: &str,
        response: &str,
        quality: f64,
        breakdown: Option<QualityBreakdown>,
    ) -> Result<Pattern, ExtractionFailure> {
        if !Self::should_extract(quality) {
            return Err(ExtractionFailure::BelowThreshold {
                quality,
                threshold: EXTRACTION_THRESHOLD,
            });
        }

        debug!(
            query_length = query.len(),
            response_length = response.len(),
            quality,
            "Extracting pattern"
        );

        let request = GenerationRequest::new(pattern_extraction_prompt(query, response, quality))
            .with_temperature(EXTRACTION_TEMPERATURE)
            .with_max_tokens(EXTRACTION_MAX_TOKENS);

        let generation = self.generator.generate(request).await.map_err(|e| {
            ExtractionFailure::GenerationFailed {
                message: e.to_string(),
            }
        })?;

        let json = json_span(&generation.text).ok_or(ExtractionFailure::NoJsonFound)?;
        debug!(
            json_length = json.len(),
            json_preview = %json.chars().take(PREVIEW_CHARS).collect::<String>(),
            "Parsing pattern JSON"
        );

        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ExtractionFailure::InvalidJson {
                message: e.to_string(),
            })?;
        let draft = PatternDraft::from_json(&value)?;

        Ok(Pattern {
            pattern_id: draft.pattern_id(),
            pattern_type: draft.pattern_type,
            domain: draft.domain,
            reasoning_steps: draft.reasoning_steps,
            success_indicators: draft.success_indicators,
            applicability: draft.applicability,
            template: draft.template,
            source_query: query.to_string(),
            source_response: response.to_string(),
            quality_score: quality,
            quality_breakdown: breakdown,
            extracted_at: Utc::now(),
            usage_count: 0,
            success_rate: 0.0,
        })
    }
}

/// Text from the first `{` through the last `}`.
fn json_span(text: &str) -> Option<&str> {
    let text = text.trim();
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Fill `{{name}}` placeholders in a template.
///
/// Placeholders without a matching variable are left untouched. Substituted
/// values are never scanned again.
pub fn apply_template(template: &str, variables: &HashMap<String, String>) -> String {
    let Some(pattern) = placeholder() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();

fn placeholder() -> Option<&'static Regex> {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").ok())
        .as_ref()
}

/// Index metadata view of a pattern.
pub fn metadata_for(pattern: &Pattern) -> PatternMetadata {
    PatternMetadata {
        pattern_type: pattern.pattern_type.clone(),
        domain: pattern.domain.clone(),
        quality_score: pattern.quality_score,
        extracted_at: pattern.extracted_at,
        usage_count: pattern.usage_count,
        success_rate: pattern.success_rate,
        applicability: pattern
            .applicability
            .chars()
            .take(APPLICABILITY_METADATA_CHARS)
            .collect(),
        reasoning_steps: pattern.reasoning_steps.clone(),
        success_indicators: pattern.success_indicators.clone(),
    }
}
