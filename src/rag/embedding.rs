use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::EmbeddingSettings;
use crate::core::errors::ProviderError;
use crate::vector_math::ensure_dimension;

const PROVIDER: &str = "huggingface";

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Output dimension; every returned vector has exactly this length.
    fn dimension(&self) -> usize;

    /// Embeds a batch, preserving input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::InvalidResponse {
            provider: "embedding",
            message: "no vector returned for query".to_string(),
        })
    }
}

/// Hugging Face inference `feature-extraction` pipeline client.
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl HuggingFaceEmbedder {
    pub fn new(settings: &EmbeddingSettings, api_token: Option<&str>) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
                ProviderError::InvalidResponse {
                    provider: PROVIDER,
                    message: "API token contains invalid header characters".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(ProviderError::transport(PROVIDER))?;

        let endpoint = format!(
            "{}/models/{}/pipeline/feature-extraction",
            settings.base_url.trim_end_matches('/'),
            settings.model
        );

        Ok(Self {
            client,
            endpoint,
            model: settings.model.clone(),
            dimension: settings.dimension,
        })
    }
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Batch(Vec<Vec<f32>>),
    Single(Vec<f32>),
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = FeatureExtractionRequest {
            inputs,
            options: RequestOptions {
                wait_for_model: true,
            },
        };
        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;

        if !res.status().is_success() {
            return Err(ProviderError::from_response(PROVIDER, res).await);
        }

        let payload: FeatureExtractionResponse = res
            .json()
            .await
            .map_err(ProviderError::invalid_response(PROVIDER))?;
        let vectors = match payload {
            FeatureExtractionResponse::Batch(vectors) => vectors,
            FeatureExtractionResponse::Single(vector) => vec![vector],
        };

        if vectors.len() != inputs.len() {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: format!(
                    "expected {} vectors, received {}",
                    inputs.len(),
                    vectors.len()
                ),
            });
        }
        for vector in &vectors {
            ensure_dimension(self.dimension, vector)?;
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String, dimension: usize) -> EmbeddingSettings {
        EmbeddingSettings {
            base_url,
            dimension,
            ..Default::default()
        }
    }

    const ENDPOINT: &str =
        "/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction";

    #[tokio::test]
    async fn embeds_batch_in_order_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("authorization", "Bearer hf_test"))
            .and(body_partial_json(json!({ "inputs": ["a", "b"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                [0.1, 0.2, 0.3],
                [0.4, 0.5, 0.6]
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HuggingFaceEmbedder::new(&settings(server.uri(), 3), Some("hf_test")).unwrap();
        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn single_vector_response_is_accepted_for_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1.0, 0.0])))
            .mount(&server)
            .await;

        let embedder = HuggingFaceEmbedder::new(&settings(server.uri(), 2), None).unwrap();
        let vector = embedder.embed_query("What is asthma?").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[1.0, 0.0]])))
            .mount(&server)
            .await;

        let embedder = HuggingFaceEmbedder::new(&settings(server.uri(), 384), None).unwrap();
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::DimensionMismatch {
                expected: 384,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn http_errors_surface_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let embedder = HuggingFaceEmbedder::new(&settings(server.uri(), 3), None).unwrap();
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        match err {
            ProviderError::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "model loading");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_skips_the_network() {
        let embedder =
            HuggingFaceEmbedder::new(&settings("http://127.0.0.1:9".to_string(), 3), None).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
