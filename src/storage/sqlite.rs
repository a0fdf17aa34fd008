use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{
    IndexCandidate, IndexEntry, IndexFilter, PatternIndex, PatternMetadata, PatternUsage,
    TermVector, UsageLog, UsageStats,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed pattern index and usage log
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database (one connection, never recycled)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        message: e.to_string(),
    })
}

#[async_trait]
impl PatternIndex for SqliteStorage {
    async fn add(
        &self,
        id: &str,
        document: &str,
        metadata: &PatternMetadata,
    ) -> StorageResult<()> {
        let terms = to_json(&TermVector::from_text(document))?;
        let metadata_json = to_json(metadata)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO patterns (id, document, terms, pattern_type, domain, quality_score, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(document)
        .bind(&terms)
        .bind(&metadata.pattern_type)
        .bind(&metadata.domain)
        .bind(metadata.quality_score)
        .bind(&metadata_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(pattern_id = %id, document_length = document.len(), "Pattern indexed");
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: &IndexFilter,
    ) -> StorageResult<Vec<IndexCandidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<PatternRow> = sqlx::query_as(
            r#"
            SELECT id, document, terms, metadata
            FROM patterns
            WHERE (? <= 0.0 OR quality_score >= ?)
              AND (? IS NULL OR pattern_type = ?)
              AND (? IS NULL OR domain = ?)
            ORDER BY rowid ASC
            "#,
        )
        .bind(filter.min_quality)
        .bind(filter.min_quality)
        .bind(filter.pattern_type.as_deref())
        .bind(filter.pattern_type.as_deref())
        .bind(filter.domain.as_deref())
        .bind(filter.domain.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let query_vector = TermVector::from_text(text);

        let mut candidates: Vec<IndexCandidate> = rows
            .into_iter()
            .filter_map(|row| {
                let metadata: PatternMetadata = match serde_json::from_str(&row.metadata) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(pattern_id = %row.id, error = %e, "Skipping pattern with unreadable metadata");
                        return None;
                    }
                };
                let document_vector = serde_json::from_str::<TermVector>(&row.terms)
                    .unwrap_or_else(|_| TermVector::from_text(&row.document));

                Some(IndexCandidate {
                    distance: query_vector.cosine_distance(&document_vector),
                    id: row.id,
                    document: row.document,
                    metadata,
                })
            })
            .collect();

        // Stable: equal distances keep insertion order
        candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        candidates.truncate(k);

        Ok(candidates)
    }

    async fn update(&self, id: &str, metadata: &PatternMetadata) -> StorageResult<()> {
        let metadata_json = to_json(metadata)?;

        let result = sqlx::query(
            r#"
            UPDATE patterns
            SET pattern_type = ?, domain = ?, quality_score = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&metadata.pattern_type)
        .bind(&metadata.domain)
        .bind(metadata.quality_score)
        .bind(&metadata_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PatternNotFound {
                pattern_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<IndexEntry>> {
        let row: Option<PatternRow> = sqlx::query_as(
            r#"
            SELECT id, document, terms, metadata
            FROM patterns
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let metadata =
                serde_json::from_str(&r.metadata).map_err(|e| StorageError::Serialization {
                    message: format!("Invalid metadata for {}: {}", r.id, e),
                })?;
            Ok(IndexEntry {
                id: r.id,
                document: r.document,
                metadata,
            })
        })
        .transpose()
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM patterns WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> StorageResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM patterns")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl UsageLog for SqliteStorage {
    async fn record_usage(&self, usage: &PatternUsage) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pattern_usage (id, query_id, pattern_id, similarity_score, effectiveness_score, improved_quality, applied_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&usage.id)
        .bind(&usage.query_id)
        .bind(&usage.pattern_id)
        .bind(usage.similarity_score)
        .bind(usage.effectiveness_score)
        .bind(usage.improved_quality)
        .bind(usage.applied_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn usage_stats(&self, pattern_id: &str) -> StorageResult<UsageStats> {
        let row: UsageStatsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS usage_count,
                COUNT(effectiveness_score) AS evaluated_count,
                SUM(CASE WHEN effectiveness_score IS NOT NULL AND improved_quality = 1 THEN 1 ELSE 0 END) AS success_count,
                AVG(similarity_score) AS avg_similarity,
                AVG(effectiveness_score) AS avg_effectiveness
            FROM pattern_usage
            WHERE pattern_id = ?
            "#,
        )
        .bind(pattern_id)
        .fetch_one(&self.pool)
        .await?;

        let evaluated_count = row.evaluated_count.max(0) as u32;
        let success_count = row.success_count.unwrap_or(0).max(0) as u32;

        Ok(UsageStats {
            pattern_id: pattern_id.to_string(),
            usage_count: row.usage_count.max(0) as u32,
            evaluated_count,
            success_count,
            success_rate: if evaluated_count > 0 {
                success_count as f64 / evaluated_count as f64
            } else {
                0.0
            },
            avg_similarity: row.avg_similarity.unwrap_or(0.0),
            avg_effectiveness: row.avg_effectiveness.unwrap_or(0.0),
        })
    }

    async fn query_usage(&self, query_id: &str) -> StorageResult<Vec<PatternUsage>> {
        let rows: Vec<UsageRow> = sqlx::query_as(
            r#"
            SELECT id, query_id, pattern_id, similarity_score, effectiveness_score, improved_quality, applied_at
            FROM pattern_usage
            WHERE query_id = ?
            ORDER BY similarity_score DESC
            "#,
        )
        .bind(query_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct PatternRow {
    id: String,
    document: String,
    terms: String,
    metadata: String,
}

#[derive(sqlx::FromRow)]
struct UsageStatsRow {
    usage_count: i64,
    evaluated_count: i64,
    success_count: Option<i64>,
    avg_similarity: Option<f64>,
    avg_effectiveness: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: String,
    query_id: String,
    pattern_id: String,
    similarity_score: f64,
    effectiveness_score: Option<f64>,
    improved_quality: Option<bool>,
    applied_at: String,
}

impl From<UsageRow> for PatternUsage {
    fn from(row: UsageRow) -> Self {
        Self {
            id: row.id,
            query_id: row.query_id,
            pattern_id: row.pattern_id,
            similarity_score: row.similarity_score,
            effectiveness_score: row.effectiveness_score,
            improved_quality: row.improved_quality,
            applied_at: DateTime::parse_from_rfc3339(&row.applied_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}
