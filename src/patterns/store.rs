//! Persistence of patterns in the semantic index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{metadata_for, Pattern};
use crate::storage::{IndexEntry, IndexFilter, PatternIndex, PatternMetadata};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSearchResult {
    /// Stored identifier.
    pub pattern_id: String,
    /// Indexed document text.
    pub document: String,
    /// Stored metadata.
    pub metadata: PatternMetadata,
    /// `1 - distance`.
    pub similarity_score: f64,
}

/// Pattern-level operations over a [`PatternIndex`].
///
/// Index failures never propagate: reads degrade to empty results and
/// writes report `false`.
#[derive(Clone)]
pub struct PatternStore {
    index: Arc<dyn PatternIndex>,
}

impl PatternStore {
    /// Wrap an index
    pub fn new(index: Arc<dyn PatternIndex>) -> Self {
        Self { index }
    }

    /// Persist a pattern.
    ///
    /// A pattern whose id is already indexed only refreshes the stored
    /// usage statistics.
    pub async fn store(&self, pattern: &Pattern) -> bool {
        let existing = match self.index.get(&pattern.pattern_id).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(pattern_id = %pattern.pattern_id, error = %e, "Pattern lookup failed");
                return false;
            }
        };

        if existing.is_some() {
            info!(pattern_id = %pattern.pattern_id, "Pattern already exists, merging usage");
            return self
                .update_usage(&pattern.pattern_id, pattern.usage_count, pattern.success_rate)
                .await;
        }

        let document = document_for(pattern);
        match self
            .index
            .add(&pattern.pattern_id, &document, &metadata_for(pattern))
            .await
        {
            Ok(()) => {
                info!(
                    pattern_id = %pattern.pattern_id,
                    pattern_type = %pattern.pattern_type,
                    domain = %pattern.domain,
                    "Pattern stored"
                );
                true
            }
            Err(e) => {
                error!(pattern_id = %pattern.pattern_id, error = %e, "Pattern storage failed");
                false
            }
        }
    }

    /// Overwrite the usage statistics of a stored pattern.
    pub async fn update_usage(&self, pattern_id: &str, usage_count: u32, success_rate: f64) -> bool {
        let mut entry = match self.get(pattern_id).await {
            Some(entry) => entry,
            None => return false,
        };
        entry.metadata.merge_usage(usage_count, success_rate);

        match self.index.update(pattern_id, &entry.metadata).await {
            Ok(()) => {
                debug!(
                    pattern_id,
                    usage_count = entry.metadata.usage_count,
                    success_rate = entry.metadata.success_rate,
                    "Pattern stats updated"
                );
                true
            }
            Err(e) => {
                error!(pattern_id, error = %e, "Pattern stats update failed");
                false
            }
        }
    }

    /// Fetch a stored pattern by id
    pub async fn get(&self, pattern_id: &str) -> Option<IndexEntry> {
        match self.index.get(pattern_id).await {
            Ok(entry) => entry,
            Err(e) => {
                error!(pattern_id, error = %e, "Pattern retrieval failed");
                None
            }
        }
    }

    /// Nearest patterns to `query` passing the filters.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        min_quality: f64,
        pattern_type: Option<&str>,
        domain: Option<&str>,
    ) -> Vec<PatternSearchResult> {
        let mut filter = IndexFilter::new(min_quality);
        if let Some(pattern_type) = pattern_type {
            filter = filter.with_pattern_type(pattern_type);
        }
        if let Some(domain) = domain {
            filter = filter.with_domain(domain);
        }

        match self.index.query(query, n_results, &filter).await {
            Ok(candidates) => {
                let results: Vec<PatternSearchResult> = candidates
                    .into_iter()
                    .map(|c| PatternSearchResult {
                        pattern_id: c.id,
                        document: c.document,
                        metadata: c.metadata,
                        similarity_score: 1.0 - c.distance,
                    })
                    .collect();
                debug!(
                    query_length = query.len(),
                    results = results.len(),
                    "Pattern search complete"
                );
                results
            }
            Err(e) => {
                error!(error = %e, "Pattern search failed");
                Vec::new()
            }
        }
    }

    /// Number of stored patterns, 0 on failure
    pub async fn get_count(&self) -> usize {
        self.index.count().await.unwrap_or_else(|e| {
            error!(error = %e, "Pattern count failed");
            0
        })
    }

    /// Remove a pattern. True when it existed and was removed.
    pub async fn delete(&self, pattern_id: &str) -> bool {
        match self.index.delete(pattern_id).await {
            Ok(removed) => {
                info!(pattern_id, removed, "Pattern delete");
                removed
            }
            Err(e) => {
                error!(pattern_id, error = %e, "Pattern deletion failed");
                false
            }
        }
    }
}

/// Embeddable document text for a pattern.
pub fn document_for(pattern: &Pattern) -> String {
    let mut lines = vec![
        format!("Pattern Type: {}", pattern.pattern_type),
        format!("Domain: {}", pattern.domain),
        format!("Applicability: {}", pattern.applicability),
        "Reasoning Steps:".to_string(),
    ];
    lines.extend(pattern.reasoning_steps.iter().map(|s| format!("- {}", s)));
    lines.push("Success Indicators:".to_string());
    lines.extend(pattern.success_indicators.iter().map(|s| format!("- {}", s)));
    lines.push(format!("Template: {}", pattern.template));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::{IndexCandidate, MockPatternIndex};
    use chrono::Utc;

    fn pattern() -> Pattern {
        Pattern {
            pattern_id: "pattern_d42f6c54".to_string(),
            pattern_type: "factual_lookup".to_string(),
            domain: "geography".to_string(),
            reasoning_steps: vec!["Identify the country".to_string(), "Recall".to_string()],
            success_indicators: vec!["Direct".to_string()],
            applicability: "Capital questions".to_string(),
            template: "{{capital}}".to_string(),
            source_query: "q".to_string(),
            source_response: "r".to_string(),
            quality_score: 0.9,
            quality_breakdown: None,
            extracted_at: Utc::now(),
            usage_count: 4,
            success_rate: 0.75,
        }
    }

    fn index_error() -> StorageError {
        StorageError::Connection {
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_document_layout() {
        let doc = document_for(&pattern());
        assert_eq!(
            doc,
            "Pattern Type: factual_lookup\nDomain: geography\nApplicability: Capital questions\n\
             Reasoning Steps:\n- Identify the country\n- Recall\nSuccess Indicators:\n- Direct\n\
             Template: {{capital}}"
        );
    }

    #[tokio::test]
    async fn test_store_new_pattern_adds() {
        let mut index = MockPatternIndex::new();
        index.expect_get().returning(|_| Ok(None));
        index
            .expect_add()
            .withf(|id, doc, meta| {
                id == "pattern_d42f6c54"
                    && doc.starts_with("Pattern Type: factual_lookup")
                    && meta.quality_score == 0.9
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        index.expect_update().times(0);

        let store = PatternStore::new(Arc::new(index));
        assert!(store.store(&pattern()).await);
    }

    #[tokio::test]
    async fn test_store_existing_pattern_merges_usage() {
        let mut index = MockPatternIndex::new();
        index.expect_get().returning(|id| {
            let mut metadata = metadata_for(&pattern());
            metadata.usage_count = 1;
            metadata.success_rate = 0.0;
            metadata.applicability = "original".to_string();
            Ok(Some(IndexEntry {
                id: id.to_string(),
                document: "doc".to_string(),
                metadata,
            }))
        });
        index.expect_add().times(0);
        index
            .expect_update()
            .withf(|_, meta| {
                meta.usage_count == 4
                    && meta.success_rate == 0.75
                    && meta.applicability == "original"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let store = PatternStore::new(Arc::new(index));
        assert!(store.store(&pattern()).await);
    }

    #[tokio::test]
    async fn test_store_failure_reports_false() {
        let mut index = MockPatternIndex::new();
        index.expect_get().returning(|_| Ok(None));
        index.expect_add().returning(|_, _, _| Err(index_error()));

        let store = PatternStore::new(Arc::new(index));
        assert!(!store.store(&pattern()).await);
    }

    #[tokio::test]
    async fn test_search_converts_distance() {
        let mut index = MockPatternIndex::new();
        index
            .expect_query()
            .withf(|_, k, filter| {
                *k == 4 && filter.min_quality == 0.7 && filter.domain.as_deref() == Some("geography")
            })
            .returning(|_, _, _| {
                Ok(vec![IndexCandidate {
                    id: "pattern_d42f6c54".to_string(),
                    document: "doc".to_string(),
                    metadata: metadata_for(&pattern()),
                    distance: 0.25,
                }])
            });

        let store = PatternStore::new(Arc::new(index));
        let results = store.search("capital", 4, 0.7, None, Some("geography")).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity_score, 0.75);
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        let mut index = MockPatternIndex::new();
        index.expect_query().returning(|_, _, _| Err(index_error()));
        index.expect_count().returning(|| Err(index_error()));
        index.expect_delete().returning(|_| Err(index_error()));
        index.expect_get().returning(|_| Err(index_error()));

        let store = PatternStore::new(Arc::new(index));
        assert!(store.search("q", 5, 0.0, None, None).await.is_empty());
        assert_eq!(store.get_count().await, 0);
        assert!(!store.delete("pattern_x").await);
        assert!(!store.update_usage("pattern_x", 1, 1.0).await);
    }
}
