//! Storage layer for the reasoning pattern library.
//!
//! This module provides the semantic pattern index (documents, metadata and
//! nearest-neighbour search) and the pattern usage log, both backed by SQLite.

mod embedding;
mod sqlite;

pub use embedding::TermVector;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// Metadata stored alongside each indexed pattern document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// Kind of reasoning (e.g. "factual_lookup").
    pub pattern_type: String,
    /// Topic area (e.g. "geography").
    pub domain: String,
    /// Quality of the answer the pattern was distilled from.
    pub quality_score: f64,
    /// When the pattern was extracted.
    pub extracted_at: DateTime<Utc>,
    /// Number of times the pattern was applied.
    #[serde(default)]
    pub usage_count: u32,
    /// Share of applications that improved answer quality.
    #[serde(default)]
    pub success_rate: f64,
    /// When the pattern applies, truncated.
    #[serde(default)]
    pub applicability: String,
    /// Recommended reasoning steps.
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    /// What made the source answer good.
    #[serde(default)]
    pub success_indicators: Vec<String>,
}

impl PatternMetadata {
    /// Replace the mutable usage statistics, leaving everything else intact.
    pub fn merge_usage(&mut self, usage_count: u32, success_rate: f64) {
        self.usage_count = usage_count;
        self.success_rate = success_rate.clamp(0.0, 1.0);
    }
}

/// Equality and threshold filters applied to index queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFilter {
    /// Minimum `quality_score`; ignored unless positive.
    pub min_quality: f64,
    /// Exact pattern type.
    pub pattern_type: Option<String>,
    /// Exact domain.
    pub domain: Option<String>,
}

impl IndexFilter {
    /// Filter on minimum quality only
    pub fn new(min_quality: f64) -> Self {
        Self {
            min_quality,
            ..Default::default()
        }
    }

    /// Restrict to one pattern type
    pub fn with_pattern_type(mut self, pattern_type: impl Into<String>) -> Self {
        self.pattern_type = Some(pattern_type.into());
        self
    }

    /// Restrict to one domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Whether a metadata record passes the filter
    pub fn matches(&self, metadata: &PatternMetadata) -> bool {
        (self.min_quality <= 0.0 || metadata.quality_score >= self.min_quality)
            && self
                .pattern_type
                .as_ref()
                .map_or(true, |t| *t == metadata.pattern_type)
            && self.domain.as_ref().map_or(true, |d| *d == metadata.domain)
    }
}

/// A stored document with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Pattern identifier.
    pub id: String,
    /// Embedded document text.
    pub document: String,
    /// Filterable metadata.
    pub metadata: PatternMetadata,
}

/// A query hit, ordered by ascending distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCandidate {
    /// Pattern identifier.
    pub id: String,
    /// Embedded document text.
    pub document: String,
    /// Filterable metadata.
    pub metadata: PatternMetadata,
    /// Cosine distance to the query, in [0, 1].
    pub distance: f64,
}

/// Semantic document index for patterns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatternIndex: Send + Sync {
    /// Index a new document under `id`.
    async fn add(&self, id: &str, document: &str, metadata: &PatternMetadata)
        -> StorageResult<()>;

    /// Up to `k` nearest documents passing `filter`, nearest first.
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: &IndexFilter,
    ) -> StorageResult<Vec<IndexCandidate>>;

    /// Replace the metadata of an existing document.
    async fn update(&self, id: &str, metadata: &PatternMetadata) -> StorageResult<()>;

    /// Fetch a document by id.
    async fn get(&self, id: &str) -> StorageResult<Option<IndexEntry>>;

    /// Remove a document; returns whether it existed.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Number of indexed documents.
    async fn count(&self) -> StorageResult<usize>;
}

/// One application of a pattern to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUsage {
    /// Usage record identifier.
    pub id: String,
    /// Query the pattern was applied to.
    pub query_id: String,
    /// Applied pattern.
    pub pattern_id: String,
    /// Retrieval similarity at the time of use.
    pub similarity_score: f64,
    /// Final minus baseline quality, when both are known.
    pub effectiveness_score: Option<f64>,
    /// Whether final quality beat the baseline.
    pub improved_quality: Option<bool>,
    /// When the pattern was applied.
    pub applied_at: DateTime<Utc>,
}

impl PatternUsage {
    /// Create a usage record without outcome information
    pub fn new(
        query_id: impl Into<String>,
        pattern_id: impl Into<String>,
        similarity_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query_id: query_id.into(),
            pattern_id: pattern_id.into(),
            similarity_score,
            effectiveness_score: None,
            improved_quality: None,
            applied_at: Utc::now(),
        }
    }

    /// Attach the quality outcome if both qualities are known
    pub fn with_outcome(mut self, baseline_quality: Option<f64>, final_quality: Option<f64>) -> Self {
        if let (Some(baseline), Some(final_quality)) = (baseline_quality, final_quality) {
            self.effectiveness_score = Some(final_quality - baseline);
            self.improved_quality = Some(final_quality > baseline);
        }
        self
    }
}

/// Aggregate usage statistics for one pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Pattern the statistics describe.
    pub pattern_id: String,
    /// Every recorded application.
    pub usage_count: u32,
    /// Applications with a known outcome.
    pub evaluated_count: u32,
    /// Evaluated applications that improved quality.
    pub success_count: u32,
    /// `success_count / evaluated_count`, or 0.
    pub success_rate: f64,
    /// Mean retrieval similarity over all applications.
    pub avg_similarity: f64,
    /// Mean effectiveness over evaluated applications.
    pub avg_effectiveness: f64,
}

impl UsageStats {
    /// Empty statistics for a pattern that was never used
    pub fn empty(pattern_id: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            ..Default::default()
        }
    }
}

/// Append-only log of pattern applications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageLog: Send + Sync {
    /// Append one usage record.
    async fn record_usage(&self, usage: &PatternUsage) -> StorageResult<()>;

    /// Aggregate statistics for a pattern.
    async fn usage_stats(&self, pattern_id: &str) -> StorageResult<UsageStats>;

    /// Usage records of one query, most similar first.
    async fn query_usage(&self, query_id: &str) -> StorageResult<Vec<PatternUsage>>;
}
