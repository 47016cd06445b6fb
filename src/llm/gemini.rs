//! Google Gemini `generativelanguage` REST adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::provider::{LanguageModel, ModelConnector};
use super::types::{ChatRequest, Role};
use crate::core::config::LlmSettings;
use crate::core::errors::ProviderError;

const PROVIDER: &str = "gemini";
const API_VERSION: &str = "v1beta";

#[derive(Clone)]
pub struct GeminiConnector {
    client: Client,
    base_url: String,
}

impl GeminiConnector {
    pub fn new(settings: &LlmSettings, api_key: &str) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).map_err(|_| ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: "API key contains invalid header characters".to_string(),
            })?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(ProviderError::transport(PROVIDER))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn model_url(&self, model_id: &str) -> String {
        format!(
            "{}/{}/models/{}",
            self.base_url,
            API_VERSION,
            urlencoding::encode(model_id)
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    #[serde(default)]
    supported_generation_methods: Option<Vec<String>>,
}

#[async_trait]
impl ModelConnector for GeminiConnector {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn connect(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        let model_id = model_id.trim().trim_start_matches("models/");
        if model_id.is_empty() {
            return Err(ProviderError::UnsupportedModel(String::new()));
        }

        let res = self
            .client
            .get(self.model_url(model_id))
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;

        match res.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                return Err(ProviderError::UnsupportedModel(model_id.to_string()));
            }
            status if !status.is_success() => {
                return Err(ProviderError::from_response(PROVIDER, res).await);
            }
            _ => {}
        }

        let info: ModelInfo = res
            .json()
            .await
            .map_err(ProviderError::invalid_response(PROVIDER))?;
        if let Some(methods) = info.supported_generation_methods {
            if !methods.iter().any(|m| m == "generateContent") {
                return Err(ProviderError::UnsupportedModel(model_id.to_string()));
            }
        }

        Ok(Arc::new(GeminiModel {
            client: self.client.clone(),
            endpoint: format!("{}:generateContent", self.model_url(model_id)),
            model_id: model_id.to_string(),
        }))
    }
}

pub struct GeminiModel {
    client: Client,
    endpoint: String,
    model_id: String,
}

impl GeminiModel {
    fn request_body(request: &ChatRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": "user", "parts": [{ "text": m.content }] }))
            .collect();

        let mut generation = Map::new();
        if let Some(t) = request.temperature {
            generation.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(n));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": Value::Object(generation),
        });
        if let (Some(system), Some(obj)) = (request.system_prompt(), body.as_object_mut()) {
            obj.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": system }] }),
            );
        }
        body
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(ProviderError::transport(PROVIDER))?;

        if !res.status().is_success() {
            return Err(ProviderError::from_response(PROVIDER, res).await);
        }

        let payload: GenerateResponse = res
            .json()
            .await
            .map_err(ProviderError::invalid_response(PROVIDER))?;

        let Some(content) = payload.candidates.into_iter().next().and_then(|c| c.content) else {
            let reason = payload
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER,
                message: reason,
            });
        };

        Ok(content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}
