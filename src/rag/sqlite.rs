//! SQLite-backed vector index.
//!
//! Offline stand-in for the hosted index: records live in a local database
//! file and queries are brute-force cosine similarity over every row.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{IndexCreation, IndexSpec, IndexState, ScoredRecord, VectorIndex, VectorRecord};
use crate::core::errors::ProviderError;
use crate::vector_math::{cosine_similarity, ensure_dimension, sort_by_score_desc};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    index_name: String,
    dimension: usize,
}

impl SqliteVectorIndex {
    pub async fn open(
        db_path: impl AsRef<Path>,
        index_name: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, ProviderError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ProviderError::storage)?;

        let index = Self {
            pool,
            index_name: index_name.into(),
            dimension,
        };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ProviderError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_indexes (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ProviderError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_records (
                index_name TEXT NOT NULL REFERENCES vector_indexes(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB NOT NULL,
                PRIMARY KEY (index_name, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ProviderError::storage)?;

        Ok(())
    }

    async fn stored_dimension(&self, name: &str) -> Result<Option<usize>, ProviderError> {
        let dimension: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM vector_indexes WHERE name = ?1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(ProviderError::storage)?;
        Ok(dimension.map(|d| d as usize))
    }

    async fn require_index(&self) -> Result<(), ProviderError> {
        match self.stored_dimension(&self.index_name).await? {
            Some(_) => Ok(()),
            None => Err(ProviderError::IndexNotFound(self.index_name.clone())),
        }
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexCreation, ProviderError> {
        if let Some(dimension) = self.stored_dimension(&spec.name).await? {
            if dimension != spec.dimension {
                return Err(ProviderError::DimensionMismatch {
                    expected: spec.dimension,
                    actual: dimension,
                });
            }
            return Ok(IndexCreation::AlreadyExists);
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO vector_indexes (name, dimension, metric) VALUES (?1, ?2, ?3)",
        )
        .bind(&spec.name)
        .bind(spec.dimension as i64)
        .bind(spec.metric.as_str())
        .execute(&self.pool)
        .await
        .map_err(ProviderError::storage)?;

        // Lost a race with another creator.
        if result.rows_affected() == 0 {
            return Ok(IndexCreation::AlreadyExists);
        }
        Ok(IndexCreation::Created)
    }

    async fn inspect(&self) -> Result<IndexState, ProviderError> {
        self.require_index().await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE index_name = ?1")
                .bind(&self.index_name)
                .fetch_one(&self.pool)
                .await
                .map_err(ProviderError::storage)?;

        Ok(match count {
            0 => IndexState::Empty,
            n => IndexState::Populated {
                vector_count: n as u64,
            },
        })
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, ProviderError> {
        for record in &records {
            ensure_dimension(self.dimension, &record.values)?;
        }
        if records.is_empty() {
            return Ok(0);
        }
        self.require_index().await?;

        let mut tx = self.pool.begin().await.map_err(ProviderError::storage)?;
        for record in &records {
            let metadata = record
                .metadata
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO vector_records (index_name, id, text, source, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&self.index_name)
            .bind(&record.id)
            .bind(&record.text)
            .bind(&record.source)
            .bind(&metadata)
            .bind(Self::serialize_embedding(&record.values))
            .execute(&mut *tx)
            .await
            .map_err(ProviderError::storage)?;
        }
        tx.commit().await.map_err(ProviderError::storage)?;

        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ProviderError> {
        ensure_dimension(self.dimension, vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, text, source, embedding FROM vector_records WHERE index_name = ?1",
        )
        .bind(&self.index_name)
        .fetch_all(&self.pool)
        .await
        .map_err(ProviderError::storage)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let bytes: Vec<u8> = row.get("embedding");
            let stored = Self::deserialize_embedding(&bytes);
            scored.push(ScoredRecord {
                id: row.get("id"),
                text: row.get("text"),
                source: row.get("source"),
                score: cosine_similarity(vector, &stored)?,
            });
        }

        sort_by_score_desc(&mut scored, |record| record.score);
        scored.truncate(top_k);
        Ok(scored)
    }
}
