use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::VidscopeError;
use crate::models::analysis::{AnalysisFields, VideoAnalysis};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the `video_analysis` table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS video_analysis (
            id            UUID PRIMARY KEY,
            video_url     TEXT NOT NULL UNIQUE,
            transcription TEXT,
            summary       TEXT,
            detection     TEXT,
            sentiment     TEXT,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Persistence for analysis records, keyed by exact video URL.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Insert or overwrite the record for `video_url`. All four text fields
    /// are replaced, blanks included; `created_at` is kept from the first insert.
    async fn upsert(
        &self,
        video_url: &str,
        fields: &AnalysisFields,
    ) -> Result<VideoAnalysis, VidscopeError>;

    async fn find_by_url(&self, video_url: &str) -> Result<Option<VideoAnalysis>, VidscopeError>;

    /// Short description of the backing store, used by `/health`.
    async fn health(&self) -> Result<String, VidscopeError>;
}

// ============================================================================
// Postgres
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn upsert(
        &self,
        video_url: &str,
        fields: &AnalysisFields,
    ) -> Result<VideoAnalysis, VidscopeError> {
        let record: VideoAnalysis = sqlx::query_as(
            r#"
            INSERT INTO video_analysis (id, video_url, transcription, summary, detection, sentiment)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (video_url) DO UPDATE SET
                transcription = EXCLUDED.transcription,
                summary       = EXCLUDED.summary,
                detection     = EXCLUDED.detection,
                sentiment     = EXCLUDED.sentiment
            RETURNING id, video_url, transcription, summary, detection, sentiment, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(video_url)
        .bind(fields.transcription.as_deref())
        .bind(fields.summary.as_deref())
        .bind(fields.detection.as_deref())
        .bind(fields.sentiment.as_deref())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(id = %record.id, video_url = %video_url, "Upserted video analysis");
        Ok(record)
    }

    async fn find_by_url(&self, video_url: &str) -> Result<Option<VideoAnalysis>, VidscopeError> {
        let record = sqlx::query_as(
            r#"
            SELECT id, video_url, transcription, summary, detection, sentiment, created_at
            FROM video_analysis
            WHERE video_url = $1
            "#,
        )
        .bind(video_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn health(&self) -> Result<String, VidscopeError> {
        Ok(health_check(&self.pool).await?)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store for tests and `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: RwLock<HashMap<String, VideoAnalysis>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn upsert(
        &self,
        video_url: &str,
        fields: &AnalysisFields,
    ) -> Result<VideoAnalysis, VidscopeError> {
        let mut records = self.records.write().await;
        let record = records
            .entry(video_url.to_string())
            .or_insert_with(|| VideoAnalysis {
                id: Uuid::new_v4(),
                video_url: video_url.to_string(),
                transcription: None,
                summary: None,
                detection: None,
                sentiment: None,
                created_at: Utc::now(),
            });

        record.transcription = fields.transcription.clone();
        record.summary = fields.summary.clone();
        record.detection = fields.detection.clone();
        record.sentiment = fields.sentiment.clone();

        Ok(record.clone())
    }

    async fn find_by_url(&self, video_url: &str) -> Result<Option<VideoAnalysis>, VidscopeError> {
        Ok(self.records.read().await.get(video_url).cloned())
    }

    async fn health(&self) -> Result<String, VidscopeError> {
        Ok(format!("in-memory ({} records)", self.len().await))
    }
}
