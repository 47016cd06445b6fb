//! Deterministic stand-ins for the hosted providers.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use healthify_backend::core::config::{AppPaths, Settings};
use healthify_backend::core::errors::ProviderError;
use healthify_backend::llm::{ChatRequest, LanguageModel, ModelConnector, Role};
use healthify_backend::rag::{
    ComponentFactory, EmbeddingProvider, IndexCreation, IndexSpec, IndexState, ScoredRecord,
    VectorIndex, VectorRecord,
};
use healthify_backend::vector_math::{cosine_similarity, sort_by_score_desc};

pub const DIMENSION: usize = 384;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "for", "how", "in", "into", "is", "it", "of", "or", "that",
    "the", "to", "too", "what", "when", "your",
];

/// Hashed bag-of-words: texts sharing content words score > 0.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn bucket(word: &str) -> usize {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % DIMENSION as u64) as usize
    }

    pub fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        let words: HashSet<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .map(|w| w.to_lowercase())
            .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
            .collect();
        for word in words {
            vector[Self::bucket(&word)] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword-hash"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.iter().map(|text| Self::vectorize(text)).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateBehavior {
    Create,
    AlreadyExists,
    Fail,
}

pub struct MemoryIndex {
    pub records: Mutex<Vec<VectorRecord>>,
    pub create_behavior: CreateBehavior,
    /// `inspect` fails this many times before succeeding.
    pub inspect_failures: AtomicUsize,
    /// While set, `query` fails as if the index went away.
    pub fail_queries: AtomicBool,
    pub create_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn new(create_behavior: CreateBehavior) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            create_behavior,
            inspect_failures: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable(times: usize) -> Self {
        let index = Self::new(CreateBehavior::Create);
        index.inspect_failures.store(times, Ordering::SeqCst);
        index
    }

    pub fn preloaded(texts: &[(&str, &str)]) -> Self {
        let index = Self::new(CreateBehavior::AlreadyExists);
        {
            let mut records = index.records.lock().unwrap();
            for (i, (source, text)) in texts.iter().enumerate() {
                records.push(VectorRecord {
                    id: format!("pre-{i}"),
                    values: KeywordEmbedder::vectorize(text),
                    text: text.to_string(),
                    source: source.to_string(),
                    metadata: None,
                });
            }
        }
        index
    }

    pub fn sources(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.source.clone())
            .collect()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory-index"
    }

    async fn create_index(&self, _spec: &IndexSpec) -> Result<IndexCreation, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.create_behavior {
            CreateBehavior::Create => Ok(IndexCreation::Created),
            CreateBehavior::AlreadyExists => Ok(IndexCreation::AlreadyExists),
            CreateBehavior::Fail => Err(ProviderError::Status {
                provider: "memory",
                status: 403,
                body: "quota exceeded".to_string(),
            }),
        }
    }

    async fn inspect(&self) -> Result<IndexState, ProviderError> {
        let remaining = self.inspect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inspect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Storage("connection refused".to_string()));
        }
        let count = self.records.lock().unwrap().len() as u64;
        Ok(match count {
            0 => IndexState::Empty,
            vector_count => IndexState::Populated { vector_count },
        })
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, ProviderError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.records.lock().unwrap();
        let n = records.len();
        for record in records {
            stored.retain(|existing| existing.id != record.id);
            stored.push(record);
        }
        Ok(n)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ProviderError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(query_outage());
        }
        let stored = self.records.lock().unwrap().clone();
        let mut scored = Vec::with_capacity(stored.len());
        for record in stored {
            scored.push(ScoredRecord {
                score: cosine_similarity(vector, &record.values)?,
                id: record.id,
                text: record.text,
                source: record.source,
            });
        }
        sort_by_score_desc(&mut scored, |r| r.score);
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// The error `MemoryIndex::query` returns while `fail_queries` is set.
pub fn query_outage() -> ProviderError {
    ProviderError::Storage("index connection reset".to_string())
}

/// Answers with the first context paragraph it was given.
pub struct EchoModel {
    id: String,
    delay: Option<Duration>,
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let context = system.split("\n\n").nth(1).unwrap_or("no context");
        Ok(format!("According to the reference: {context}"))
    }
}

pub struct FakeConnector {
    pub rejected: Vec<String>,
    pub connect_delay: Option<Duration>,
    pub answer_delay: Option<Duration>,
    pub connect_calls: AtomicUsize,
}

impl FakeConnector {
    pub fn accepting_all() -> Self {
        Self::rejecting(&[])
    }

    pub fn rejecting(models: &[&str]) -> Self {
        Self {
            rejected: models.iter().map(|m| m.to_string()).collect(),
            connect_delay: None,
            answer_delay: None,
            connect_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ModelConnector for FakeConnector {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn connect(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejected.iter().any(|m| m == model_id) {
            return Err(ProviderError::UnsupportedModel(model_id.to_string()));
        }
        Ok(Arc::new(EchoModel {
            id: model_id.to_string(),
            delay: self.answer_delay,
        }))
    }
}

pub struct TestComponents {
    pub connector: Arc<FakeConnector>,
    pub embedder: Arc<KeywordEmbedder>,
    pub index: Arc<MemoryIndex>,
    pub factory_calls: AtomicUsize,
}

impl TestComponents {
    pub fn new(connector: FakeConnector, index: MemoryIndex) -> Arc<Self> {
        Arc::new(Self {
            connector: Arc::new(connector),
            embedder: Arc::new(KeywordEmbedder::new()),
            index: Arc::new(index),
            factory_calls: AtomicUsize::new(0),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(
            FakeConnector::accepting_all(),
            MemoryIndex::new(CreateBehavior::Create),
        )
    }
}

#[async_trait]
impl ComponentFactory for TestComponents {
    async fn model_connector(
        &self,
        _api_key: &str,
    ) -> Result<Arc<dyn ModelConnector>, ProviderError> {
        self.factory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.connector.clone())
    }

    async fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        Ok(self.embedder.clone())
    }

    async fn vector_index(
        &self,
        _api_key: Option<&str>,
        _dimension: usize,
    ) -> Result<Arc<dyn VectorIndex>, ProviderError> {
        Ok(self.index.clone())
    }
}

/// Defaults plus both hosted credentials.
pub fn settings_with_keys() -> Settings {
    let mut settings = Settings::default();
    settings.credentials.llm_api_key = Some("gemini-test".to_string());
    settings.credentials.index_api_key = Some("pinecone-test".to_string());
    settings
}

pub fn temp_paths(dir: &tempfile::TempDir) -> Arc<AppPaths> {
    Arc::new(AppPaths::with_data_dir(
        dir.path().to_path_buf(),
        dir.path().join("data"),
    ))
}
