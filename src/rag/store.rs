//! VectorIndex trait — abstract interface over the nearest-neighbour store.
//!
//! The hosted implementation is `PineconeIndex`; `SqliteVectorIndex` keeps
//! everything in a local database file for offline use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// A stored segment with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
    pub source: String,
    pub metadata: Option<Value>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub source: String,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Populated { vector_count: u64 },
    Empty,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Creates the index. An existing index is reported as
    /// `IndexCreation::AlreadyExists`, never as an error.
    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexCreation, ProviderError>;

    /// Reports whether the index holds any vectors. Errors mean the index
    /// could not be reached, not that it is empty.
    async fn inspect(&self) -> Result<IndexState, ProviderError>;

    /// Inserts or overwrites records by id. Returns the number written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, ProviderError>;

    /// Up to `top_k` nearest records, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ProviderError>;
}
