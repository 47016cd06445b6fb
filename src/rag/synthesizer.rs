use std::sync::Arc;

use crate::core::config::LlmSettings;
use crate::llm::{ChatMessage, ChatRequest, LanguageModel};

const SYSTEM_PROMPT: &str = "You are a medical assistant for the healthcare app. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise and medically accurate.";

pub const UNAVAILABLE_ANSWER: &str =
    "I'm sorry, I couldn't generate an answer right now. Please try again later.";

/// Turns a question plus retrieved context into a grounded answer.
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    settings: LlmSettings,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, settings: &LlmSettings) -> Self {
        Self {
            model,
            settings: settings.clone(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub(crate) fn build_request(&self, question: &str, context: &[String]) -> ChatRequest {
        let system = format!("{}\n\n{}", SYSTEM_PROMPT, context.join("\n\n"));
        ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(question)])
            .with_settings(&self.settings)
    }

    /// Model failures are logged and replaced by `UNAVAILABLE_ANSWER`.
    pub async fn synthesize(&self, question: &str, context: &[String]) -> String {
        let request = self.build_request(question, context);
        match self.model.chat(request).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Model '{}' returned an empty answer", self.model_id());
                UNAVAILABLE_ANSWER.to_string()
            }
            Err(err) => {
                tracing::error!("Answer synthesis with '{}' failed: {}", self.model_id(), err);
                UNAVAILABLE_ANSWER.to_string()
            }
        }
    }
}
