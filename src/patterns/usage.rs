//! Crediting patterns for the answers they helped produce.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{AppliedPattern, PatternStore};
use crate::storage::{PatternUsage, UsageLog, UsageStats};

/// Records pattern applications and folds the results back into the store.
#[derive(Clone)]
pub struct PatternUsageTracker {
    log: Arc<dyn UsageLog>,
    store: PatternStore,
}

impl PatternUsageTracker {
    /// Create a tracker over a usage log and the pattern store
    pub fn new(log: Arc<dyn UsageLog>, store: PatternStore) -> Self {
        Self { log, store }
    }

    /// Record one usage row per applied pattern.
    ///
    /// With both qualities known, each row carries the effectiveness
    /// (`final - baseline`). After writing, the refreshed aggregate is
    /// merged into the pattern's stored metadata. Failures are logged and
    /// skipped; the ids of the rows written are returned.
    pub async fn record_usage(
        &self,
        query_id: &str,
        applied: &[AppliedPattern],
        baseline_quality: Option<f64>,
        final_quality: Option<f64>,
    ) -> Vec<String> {
        let mut usage_ids = Vec::with_capacity(applied.len());

        for pattern in applied {
            if pattern.pattern_id.is_empty() {
                continue;
            }

            let usage = PatternUsage::new(query_id, &pattern.pattern_id, pattern.similarity)
                .with_outcome(baseline_quality, final_quality);

            if let Err(e) = self.log.record_usage(&usage).await {
                error!(pattern_id = %pattern.pattern_id, query_id, error = %e, "Pattern usage record failed");
                continue;
            }
            info!(
                pattern_id = %pattern.pattern_id,
                query_id,
                similarity = pattern.similarity,
                effectiveness = ?usage.effectiveness_score,
                "Pattern usage recorded"
            );
            usage_ids.push(usage.id);

            self.refresh_store_stats(&pattern.pattern_id).await;
        }

        usage_ids
    }

    /// Aggregate statistics for one pattern, empty on failure
    pub async fn usage_stats(&self, pattern_id: &str) -> UsageStats {
        match self.log.usage_stats(pattern_id).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(pattern_id, error = %e, "Pattern usage stats failed");
                UsageStats::empty(pattern_id)
            }
        }
    }

    /// Usage rows recorded for one query, empty on failure
    pub async fn query_usage(&self, query_id: &str) -> Vec<PatternUsage> {
        self.log.query_usage(query_id).await.unwrap_or_else(|e| {
            error!(query_id, error = %e, "Query pattern usage lookup failed");
            Vec::new()
        })
    }

    async fn refresh_store_stats(&self, pattern_id: &str) {
        let stats = match self.log.usage_stats(pattern_id).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(pattern_id, error = %e, "Skipping store stats refresh");
                return;
            }
        };
        if !self
            .store
            .update_usage(pattern_id, stats.usage_count, stats.success_rate)
            .await
        {
            warn!(pattern_id, "Pattern missing from store, stats not merged");
        }
    }
}
