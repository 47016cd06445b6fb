//! Typed view of the merged `config.yml` + `secrets.yaml` document.
//!
//! Every section has serde defaults so an empty config file yields a working
//! setup; only the two hosted-service credentials have no default.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LLM_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const INDEX_API_KEY_ENV: &str = "PINECONE_API_KEY";
pub const EMBEDDING_TOKEN_ENV: &str = "HF_API_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub vector_index: VectorIndexSettings,
    pub rag: RagSettings,
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Chatbot queries accepted per minute across all clients.
    pub chatbot_requests_per_minute: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
            chatbot_requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    /// Candidates in preference order; the first one the provider accepts wins.
    pub models: Vec<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            models: vec![
                "gemini-1.5-flash-8b".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
            ],
            temperature: 0.4,
            max_output_tokens: 500,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co/hf-inference".to_string(),
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            concurrency: 2,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexProvider {
    Pinecone,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexSettings {
    pub provider: IndexProvider,
    pub index_name: String,
    pub control_plane_url: String,
    pub cloud: String,
    pub region: String,
    /// How long to wait for a freshly created index to report ready.
    pub ready_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Overrides the default `<data_dir>/vector_index.db` for the sqlite provider.
    pub sqlite_path: Option<PathBuf>,
}

impl Default for VectorIndexSettings {
    fn default() -> Self {
        Self {
            provider: IndexProvider::Pinecone,
            index_name: "healthcare-medicalbot".to_string(),
            control_plane_url: "https://api.pinecone.io".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            ready_timeout_secs: 120,
            request_timeout_secs: 30,
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Directory of PDFs used to seed an empty index.
    pub data_dir: Option<PathBuf>,
    pub ask_timeout_secs: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 20,
            top_k: 3,
            data_dir: None,
            ask_timeout_secs: 60,
        }
    }
}

/// Secrets for the hosted providers. Never printed.
#[derive(Clone, Default)]
pub struct Credentials {
    pub llm_api_key: Option<String>,
    pub index_api_key: Option<String>,
    pub embedding_token: Option<String>,
}

impl Credentials {
    /// Environment variables win over `secrets.yaml`; blank values count as absent.
    pub fn resolve<F>(config: &Value, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |value: String| {
            let value = value.trim().to_string();
            (!value.is_empty()).then_some(value)
        };
        let pick = |var: &str, section: &str, key: &str| {
            env(var).and_then(non_blank).or_else(|| {
                config
                    .get(section)
                    .and_then(|s| s.get(key))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .and_then(non_blank)
            })
        };

        Self {
            llm_api_key: pick(LLM_API_KEY_ENV, "llm", "api_key"),
            index_api_key: pick(INDEX_API_KEY_ENV, "vector_index", "api_key"),
            embedding_token: pick(EMBEDDING_TOKEN_ENV, "embedding", "api_token"),
        }
    }

    pub fn has_llm_api_key(&self) -> bool {
        self.llm_api_key.is_some()
    }

    pub fn has_index_api_key(&self) -> bool {
        self.index_api_key.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "****"))
            .field("index_api_key", &self.index_api_key.as_ref().map(|_| "****"))
            .field(
                "embedding_token",
                &self.embedding_token.as_ref().map(|_| "****"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.rag.chunk_size, 500);
        assert_eq!(settings.rag.chunk_overlap, 20);
        assert_eq!(settings.rag.top_k, 3);
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.vector_index.index_name, "healthcare-medicalbot");
        assert_eq!(settings.vector_index.provider, IndexProvider::Pinecone);
        assert_eq!(settings.llm.models.len(), 3);
        assert!((settings.llm.temperature - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "rag": { "top_k": 5 },
            "vector_index": { "provider": "sqlite" }
        }))
        .unwrap();
        assert_eq!(settings.rag.top_k, 5);
        assert_eq!(settings.rag.chunk_size, 500);
        assert_eq!(settings.vector_index.provider, IndexProvider::Sqlite);
    }

    #[test]
    fn env_overrides_secrets_file() {
        let config = json!({
            "llm": { "api_key": "from-file" },
            "vector_index": { "api_key": "index-from-file" }
        });
        let creds = Credentials::resolve(&config, |var| {
            (var == LLM_API_KEY_ENV).then(|| "from-env".to_string())
        });
        assert_eq!(creds.llm_api_key.as_deref(), Some("from-env"));
        assert_eq!(creds.index_api_key.as_deref(), Some("index-from-file"));
        assert!(creds.embedding_token.is_none());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = json!({ "llm": { "api_key": "   " } });
        let creds = Credentials::resolve(&config, |_| None);
        assert!(!creds.has_llm_api_key());
        assert!(!creds.has_index_api_key());
    }

    #[test]
    fn blank_env_falls_back_to_secrets_file() {
        let config = json!({ "llm": { "api_key": " from-secrets " } });
        let creds = Credentials::resolve(&config, |var| {
            (var == LLM_API_KEY_ENV).then(|| "   ".to_string())
        });
        assert_eq!(creds.llm_api_key.as_deref(), Some("from-secrets"));
    }

    #[test]
    fn debug_output_never_contains_secrets() {
        let creds = Credentials {
            llm_api_key: Some("super-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("****"));
    }
}
