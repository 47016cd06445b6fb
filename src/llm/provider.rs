use std::sync::Arc;

use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::ProviderError;

/// A bound, ready-to-use chat model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Non-streaming completion; returns the generated text.
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;
}

/// Binds model identifiers on a hosted provider.
#[async_trait]
pub trait ModelConnector: Send + Sync {
    /// Provider name (e.g. "gemini").
    fn provider(&self) -> &str;

    /// Verifies `model_id` is available and returns a handle to it.
    /// An unknown model yields `ProviderError::UnsupportedModel`.
    async fn connect(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, ProviderError>;
}
