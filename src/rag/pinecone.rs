//! Pinecone REST client.
//!
//! Control-plane calls (create/describe) go to `control_plane_url`; data-plane
//! calls go to the per-index host returned by describe, resolved once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use super::store::{IndexCreation, IndexSpec, IndexState, ScoredRecord, VectorIndex, VectorRecord};
use crate::core::config::VectorIndexSettings;
use crate::core::errors::ProviderError;
use crate::vector_math::ensure_dimension;

const PROVIDER: &str = "pinecone";
const API_VERSION: &str = "2024-07";
const UPSERT_BATCH_SIZE: usize = 100;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct PineconeIndex {
    client: Client,
    control_plane_url: String,
    index_name: String,
    dimension: usize,
    cloud: String,
    region: String,
    ready_timeout: Duration,
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(
        settings: &VectorIndexSettings,
        api_key: &str,
        dimension: usize,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim()).map_err(|_| ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: "API key contains invalid header characters".to_string(),
            })?,
        );
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(ProviderError::transport(PROVIDER))?;

        Ok(Self {
            client,
            control_plane_url: settings.control_plane_url.trim_end_matches('/').to_string(),
            index_name: settings.index_name.clone(),
            dimension,
            cloud: settings.cloud.clone(),
            region: settings.region.clone(),
            ready_timeout: Duration::from_secs(settings.ready_timeout_secs),
            host: OnceCell::new(),
        })
    }

    async fn describe(&self) -> Result<IndexDescription, ProviderError> {
        let url = format!(
            "{}/indexes/{}",
            self.control_plane_url,
            urlencoding::encode(&self.index_name)
        );
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;

        if res.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::IndexNotFound(self.index_name.clone()));
        }
        if !res.status().is_success() {
            return Err(ProviderError::from_response(PROVIDER, res).await);
        }

        res.json()
            .await
            .map_err(ProviderError::invalid_response(PROVIDER))
    }

    async fn host(&self) -> Result<&str, ProviderError> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let description = self.describe().await?;
                if let Some(dimension) = description.dimension {
                    if dimension != self.dimension {
                        return Err(ProviderError::DimensionMismatch {
                            expected: self.dimension,
                            actual: dimension,
                        });
                    }
                }
                Ok(normalize_host(&description.host))
            })
            .await?;
        Ok(host.as_str())
    }

    async fn wait_until_ready(&self) -> Result<(), ProviderError> {
        if self.ready_timeout.is_zero() {
            return Ok(());
        }

        let started = Instant::now();
        loop {
            let description = self.describe().await?;
            if description.status.map(|s| s.ready).unwrap_or(false) {
                return Ok(());
            }
            if started.elapsed() >= self.ready_timeout {
                return Err(ProviderError::InvalidResponse {
                    provider: PROVIDER,
                    message: format!(
                        "index '{}' not ready after {:?}",
                        self.index_name, self.ready_timeout
                    ),
                });
            }
            tracing::debug!("Waiting for Pinecone index '{}' to become ready", self.index_name);
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn post_data_plane<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.host().await?, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;

        if !res.status().is_success() {
            return Err(ProviderError::from_response(PROVIDER, res).await);
        }
        Ok(res)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Pinecone metadata must be flat: keep scalars and string lists only.
fn record_metadata(record: &VectorRecord) -> Value {
    let mut metadata = Map::new();
    if let Some(Value::Object(extra)) = &record.metadata {
        for (key, value) in extra {
            let flat = match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
                Value::Array(items) => items.iter().all(Value::is_string),
                _ => false,
            };
            if flat {
                metadata.insert(key.clone(), value.clone());
            }
        }
    }
    metadata.insert("text".to_string(), Value::String(record.text.clone()));
    metadata.insert("source".to_string(), Value::String(record.source.clone()));
    Value::Object(metadata)
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.index_name
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexCreation, ProviderError> {
        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric.as_str(),
            "spec": {
                "serverless": { "cloud": self.cloud, "region": self.region }
            }
        });

        let res = self
            .client
            .post(format!("{}/indexes", self.control_plane_url))
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;

        match res.status() {
            StatusCode::CONFLICT => Ok(IndexCreation::AlreadyExists),
            status if status.is_success() => {
                self.wait_until_ready().await?;
                Ok(IndexCreation::Created)
            }
            _ => Err(ProviderError::from_response(PROVIDER, res).await),
        }
    }

    async fn inspect(&self) -> Result<IndexState, ProviderError> {
        let res = self
            .post_data_plane("/describe_index_stats", &json!({}))
            .await?;
        let stats: IndexStats = res
            .json()
            .await
            .map_err(ProviderError::invalid_response(PROVIDER))?;

        if let Some(dimension) = stats.dimension {
            if dimension != self.dimension {
                return Err(ProviderError::DimensionMismatch {
                    expected: self.dimension,
                    actual: dimension,
                });
            }
        }

        Ok(match stats.total_vector_count {
            0 => IndexState::Empty,
            vector_count => IndexState::Populated { vector_count },
        })
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, ProviderError> {
        for record in &records {
            ensure_dimension(self.dimension, &record.values)?;
        }

        let mut upserted = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<Value> = batch
                .iter()
                .map(|record| {
                    json!({
                        "id": record.id,
                        "values": record.values,
                        "metadata": record_metadata(record),
                    })
                })
                .collect();

            let res = self
                .post_data_plane("/vectors/upsert", &json!({ "vectors": vectors }))
                .await?;
            let payload: UpsertResponse = res
                .json()
                .await
                .map_err(ProviderError::invalid_response(PROVIDER))?;
            upserted += payload.upserted_count;
        }

        Ok(upserted)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ProviderError> {
        ensure_dimension(self.dimension, vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let res = self.post_data_plane("/query", &body).await?;
        let payload: QueryResponse = res
            .json()
            .await
            .map_err(ProviderError::invalid_response(PROVIDER))?;

        let records = payload
            .matches
            .into_iter()
            .map(|m| {
                let field = |key: &str| {
                    m.metadata
                        .as_ref()
                        .and_then(|meta| meta.get(key))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                ScoredRecord {
                    text: field("text"),
                    source: field("source"),
                    id: m.id,
                    score: m.score,
                }
            })
            .collect();

        Ok(records)
    }
}
