use std::fmt;
use std::sync::Arc;

use super::provider::{LanguageModel, ModelConnector};
use crate::core::errors::ProviderError;

#[derive(Debug)]
pub struct ModelAttempt {
    pub model_id: String,
    pub error: ProviderError,
}

/// Every candidate was rejected.
#[derive(Debug)]
pub struct ModelSelectionError {
    pub attempts: Vec<ModelAttempt>,
}

impl fmt::Display for ModelSelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no model candidates configured");
        }
        write!(f, "no candidate model could be bound (")?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", attempt.model_id, attempt.error)?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for ModelSelectionError {}

/// Tries `candidates` in order and returns the first model the provider accepts.
pub async fn select_model(
    connector: &dyn ModelConnector,
    candidates: &[String],
) -> Result<Arc<dyn LanguageModel>, ModelSelectionError> {
    let mut attempts = Vec::new();

    for model_id in candidates {
        match connector.connect(model_id).await {
            Ok(model) => {
                tracing::info!(
                    "Using {} model '{}' after {} rejected candidate(s)",
                    connector.provider(),
                    model.model_id(),
                    attempts.len()
                );
                return Ok(model);
            }
            Err(error) => {
                tracing::warn!("Model '{}' unavailable: {}", model_id, error);
                attempts.push(ModelAttempt {
                    model_id: model_id.clone(),
                    error,
                });
            }
        }
    }

    Err(ModelSelectionError { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubModel(String);

    #[async_trait]
    impl LanguageModel for StubModel {
        fn model_id(&self) -> &str {
            &self.0
        }

        async fn chat(&self, _request: ChatRequest) -> Result<String, ProviderError> {
            Ok(String::new())
        }
    }

    struct StubConnector {
        accepted: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelConnector for StubConnector {
        fn provider(&self) -> &str {
            "stub"
        }

        async fn connect(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accepted.iter().any(|m| *m == model_id) {
                Ok(Arc::new(StubModel(model_id.to_string())))
            } else {
                Err(ProviderError::UnsupportedModel(model_id.to_string()))
            }
        }
    }

    fn candidates() -> Vec<String> {
        ["flash-8b", "flash", "pro"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn first_accepted_candidate_wins() {
        let connector = StubConnector {
            accepted: vec!["flash", "pro"],
            calls: AtomicUsize::new(0),
        };
        let model = select_model(&connector, &candidates()).await.unwrap();
        assert_eq!(model.model_id(), "flash");
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_rejections_are_reported_in_order() {
        let connector = StubConnector {
            accepted: vec![],
            calls: AtomicUsize::new(0),
        };
        let err = select_model(&connector, &candidates()).await.err().unwrap();
        let ids: Vec<_> = err.attempts.iter().map(|a| a.model_id.as_str()).collect();
        assert_eq!(ids, vec!["flash-8b", "flash", "pro"]);
        assert!(err.to_string().contains("pro: model 'pro' is not supported"));
    }

    #[tokio::test]
    async fn empty_candidate_list_fails() {
        let connector = StubConnector {
            accepted: vec!["flash"],
            calls: AtomicUsize::new(0),
        };
        let err = select_model(&connector, &[]).await.err().unwrap();
        assert!(err.attempts.is_empty());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }
}
