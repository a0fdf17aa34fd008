//! Ranking stored patterns against a new query.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PatternSearchResult, PatternStore};
use crate::storage::PatternMetadata;

/// Usage count at which the usage component saturates.
const USAGE_SATURATION: u32 = 100;

/// Weights of the composite ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    /// Weight of semantic similarity.
    pub similarity: f64,
    /// Weight of the source answer's quality.
    pub quality: f64,
    /// Weight of the historical success rate.
    pub success_rate: f64,
    /// Weight of the normalized usage count.
    pub usage_count: f64,
}

impl RankingWeights {
    /// The fixed production weights.
    pub const DEFAULT: RankingWeights = RankingWeights {
        similarity: 0.6,
        quality: 0.2,
        success_rate: 0.15,
        usage_count: 0.05,
    };
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A retrieved pattern with its composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPattern {
    /// Stored identifier.
    pub pattern_id: String,
    /// Indexed document text.
    pub document: String,
    /// Stored metadata.
    pub metadata: PatternMetadata,
    /// Semantic similarity to the query.
    pub similarity_score: f64,
    /// Composite score used for ordering.
    pub ranking_score: f64,
}

/// Snapshot of the retrieval setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// Patterns currently stored.
    pub total_patterns: usize,
    /// Weights used for ranking.
    pub ranking_weights: RankingWeights,
}

/// Composite score of one candidate.
pub fn ranking_score(similarity: f64, metadata: &PatternMetadata) -> f64 {
    let weights = RankingWeights::DEFAULT;
    let usage = f64::from(metadata.usage_count.min(USAGE_SATURATION)) / f64::from(USAGE_SATURATION);
    weights.similarity * similarity
        + weights.quality * metadata.quality_score
        + weights.success_rate * metadata.success_rate
        + weights.usage_count * usage
}

/// Retrieves and orders patterns for a query.
#[derive(Clone)]
pub struct PatternRetriever {
    store: PatternStore,
}

impl PatternRetriever {
    /// Create a retriever over a store
    pub fn new(store: PatternStore) -> Self {
        Self { store }
    }

    /// Top `n_results` patterns for `query`, best first.
    ///
    /// Twice as many candidates as requested are fetched, those below
    /// `min_similarity` are dropped and the rest are ordered by
    /// [`ranking_score`]. Ties keep the store's order.
    pub async fn retrieve(
        &self,
        query: &str,
        n_results: usize,
        min_quality: f64,
        min_similarity: f64,
    ) -> Vec<RankedPattern> {
        if n_results == 0 {
            return Vec::new();
        }

        let candidates = self
            .store
            .search(query, n_results * 2, min_quality, None, None)
            .await;
        if candidates.is_empty() {
            debug!(query_length = query.len(), "No patterns found");
            return Vec::new();
        }

        let candidate_count = candidates.len();
        let mut ranked: Vec<RankedPattern> = candidates
            .into_iter()
            .filter(|c| c.similarity_score >= min_similarity)
            .map(rank)
            .collect();

        if ranked.is_empty() {
            debug!(
                candidates = candidate_count,
                min_similarity, "All patterns filtered out"
            );
            return Vec::new();
        }

        // sort_by is stable, equal scores keep insertion order
        ranked.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
        ranked.truncate(n_results);

        info!(
            retrieved = ranked.len(),
            top_score = ranked.first().map(|p| p.ranking_score).unwrap_or(0.0),
            "Patterns retrieved"
        );
        ranked
    }

    /// Stored pattern count and ranking weights
    pub async fn retrieval_stats(&self) -> RetrievalStats {
        RetrievalStats {
            total_patterns: self.store.get_count().await,
            ranking_weights: RankingWeights::DEFAULT,
        }
    }
}

fn rank(candidate: PatternSearchResult) -> RankedPattern {
    let ranking_score = ranking_score(candidate.similarity_score, &candidate.metadata);
    debug!(
        pattern_id = %candidate.pattern_id,
        ranking_score,
        similarity = candidate.similarity_score,
        quality = candidate.metadata.quality_score,
        "Pattern scored"
    );
    RankedPattern {
        pattern_id: candidate.pattern_id,
        document: candidate.document,
        metadata: candidate.metadata,
        similarity_score: candidate.similarity_score,
        ranking_score,
    }
}
