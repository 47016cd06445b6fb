pub mod gemini;
pub mod provider;
pub mod selection;
pub mod types;

pub use gemini::{GeminiConnector, GeminiModel};
pub use provider::{LanguageModel, ModelConnector};
pub use selection::{select_model, ModelAttempt, ModelSelectionError};
pub use types::{ChatMessage, ChatRequest, Role};
