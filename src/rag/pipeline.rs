//! Pipeline orchestrator.
//!
//! Owns the lazily built RAG components. `initialize` is single-flight: the
//! first caller runs the whole sequence while concurrent callers wait on the
//! same once-cell, and a failed attempt leaves the cell empty so a later call
//! can retry.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::chunker::ChunkSplitter;
use super::document::{load_pdf_directory, seed_documents, Document};
use super::embedding::{EmbeddingProvider, HuggingFaceEmbedder};
use super::error::PipelineError;
use super::ingest::{IngestReport, Ingestor};
use super::pinecone::PineconeIndex;
use super::retriever::{RetrievedSegment, Retriever};
use super::sqlite::SqliteVectorIndex;
use super::store::{IndexCreation, IndexSpec, IndexState, Metric, VectorIndex};
use super::synthesizer::AnswerSynthesizer;
use crate::core::config::settings::{INDEX_API_KEY_ENV, LLM_API_KEY_ENV};
use crate::core::config::{AppPaths, IndexProvider, Settings};
use crate::core::errors::ProviderError;
use crate::llm::{select_model, GeminiConnector, ModelConnector};

/// Builds the hosted capabilities the pipeline is assembled from.
#[async_trait]
pub trait ComponentFactory: Send + Sync {
    async fn model_connector(&self, api_key: &str)
        -> Result<Arc<dyn ModelConnector>, ProviderError>;

    async fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, ProviderError>;

    async fn vector_index(
        &self,
        api_key: Option<&str>,
        dimension: usize,
    ) -> Result<Arc<dyn VectorIndex>, ProviderError>;
}

/// Gemini + Hugging Face + Pinecone (or the local SQLite index).
pub struct HostedComponents {
    settings: Arc<Settings>,
    paths: Arc<AppPaths>,
}

impl HostedComponents {
    pub fn new(settings: Arc<Settings>, paths: Arc<AppPaths>) -> Self {
        Self { settings, paths }
    }
}

#[async_trait]
impl ComponentFactory for HostedComponents {
    async fn model_connector(
        &self,
        api_key: &str,
    ) -> Result<Arc<dyn ModelConnector>, ProviderError> {
        Ok(Arc::new(GeminiConnector::new(&self.settings.llm, api_key)?))
    }

    async fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        let token = self.settings.credentials.embedding_token.as_deref();
        Ok(Arc::new(HuggingFaceEmbedder::new(
            &self.settings.embedding,
            token,
        )?))
    }

    async fn vector_index(
        &self,
        api_key: Option<&str>,
        dimension: usize,
    ) -> Result<Arc<dyn VectorIndex>, ProviderError> {
        let settings = &self.settings.vector_index;
        match settings.provider {
            IndexProvider::Pinecone => {
                let api_key = api_key.ok_or(ProviderError::MissingApiKey("pinecone"))?;
                Ok(Arc::new(PineconeIndex::new(settings, api_key, dimension)?))
            }
            IndexProvider::Sqlite => {
                let path = settings
                    .sqlite_path
                    .clone()
                    .unwrap_or_else(|| self.paths.index_db_path.clone());
                Ok(Arc::new(
                    SqliteVectorIndex::open(path, settings.index_name.clone(), dimension).await?,
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uninitialized,
    Initializing,
    Ready,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Initializing,
            2 => PipelineState::Ready,
            _ => PipelineState::Uninitialized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Initializing => "initializing",
            PipelineState::Ready => "ready",
        }
    }
}

/// Resets the phase to `Uninitialized` unless completed, so a cancelled or
/// failed initialization never leaves the status stuck at `Initializing`.
struct PhaseGuard<'a> {
    phase: &'a AtomicU8,
    completed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a AtomicU8) -> Self {
        phase.store(PipelineState::Initializing as u8, Ordering::SeqCst);
        Self {
            phase,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.phase.store(PipelineState::Ready as u8, Ordering::SeqCst);
        self.completed = true;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.phase
                .store(PipelineState::Uninitialized as u8, Ordering::SeqCst);
        }
    }
}

/// Components available once initialization has succeeded. Read-only.
pub struct ReadyPipeline {
    retriever: Arc<Retriever>,
    synthesizer: Arc<AnswerSynthesizer>,
    ingestor: Ingestor,
    index_name: String,
}

impl ReadyPipeline {
    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn synthesizer(&self) -> &Arc<AnswerSynthesizer> {
        &self.synthesizer
    }

    pub fn model_id(&self) -> &str {
        self.synthesizer.model_id()
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn respond(&self, question: &str) -> Result<Answer, PipelineError> {
        let sources = self
            .retriever
            .retrieve(question, None)
            .await
            .map_err(PipelineError::Retrieval)?;
        let context: Vec<String> = sources.iter().map(|s| s.text.clone()).collect();
        let text = self.synthesizer.synthesize(question, &context).await;

        Ok(Answer {
            question: question.to_string(),
            text,
            sources,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<RetrievedSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub gemini_api_key: &'static str,
    pub pinecone_api_key: &'static str,
    pub initialized: bool,
    pub state: &'static str,
    pub model: Option<String>,
    pub index_name: String,
}

fn presence(flag: bool) -> &'static str {
    if flag {
        "✓"
    } else {
        "✗"
    }
}

/// The user-facing message `ask` returns for any failure.
pub fn apology(reason: impl fmt::Display) -> String {
    format!(
        "I'm sorry, I encountered an error: {}. Please try again or contact support.",
        reason
    )
}

pub struct RagPipeline {
    settings: Arc<Settings>,
    factory: Arc<dyn ComponentFactory>,
    splitter: ChunkSplitter,
    ready: OnceCell<Arc<ReadyPipeline>>,
    phase: AtomicU8,
    ask_timeout: Duration,
}

impl RagPipeline {
    pub fn new(
        settings: Arc<Settings>,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<Self, PipelineError> {
        let splitter = ChunkSplitter::new(settings.rag.chunk_size, settings.rag.chunk_overlap)?;
        let ask_timeout = Duration::from_secs(settings.rag.ask_timeout_secs);
        Ok(Self {
            settings,
            factory,
            splitter,
            ready: OnceCell::new(),
            phase: AtomicU8::new(PipelineState::Uninitialized as u8),
            ask_timeout,
        })
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Builds the components on first use; later calls return the same instance.
    pub async fn initialize(&self) -> Result<Arc<ReadyPipeline>, PipelineError> {
        let ready = self
            .ready
            .get_or_try_init(|| async {
                let guard = PhaseGuard::enter(&self.phase);
                let ready = self.build().await.map_err(|err| {
                    tracing::error!("Pipeline initialization failed: {}", err);
                    err
                })?;
                guard.complete();
                Ok::<_, PipelineError>(Arc::new(ready))
            })
            .await?;
        Ok(Arc::clone(ready))
    }

    async fn build(&self) -> Result<ReadyPipeline, PipelineError> {
        let settings = &self.settings;
        tracing::info!("Initializing medical RAG pipeline");

        let llm_key = settings
            .credentials
            .llm_api_key
            .as_deref()
            .ok_or(PipelineError::MissingCredential(LLM_API_KEY_ENV))?;
        let index_key = settings.credentials.index_api_key.as_deref();
        if settings.vector_index.provider == IndexProvider::Pinecone && index_key.is_none() {
            return Err(PipelineError::MissingCredential(INDEX_API_KEY_ENV));
        }

        let connector = self
            .factory
            .model_connector(llm_key)
            .await
            .map_err(|source| PipelineError::Construction {
                component: "model connector",
                source,
            })?;
        let model = select_model(connector.as_ref(), &settings.llm.models).await?;

        let embedder = self
            .factory
            .embedder()
            .await
            .map_err(|source| PipelineError::Construction {
                component: "embedding provider",
                source,
            })?;

        let index = self
            .factory
            .vector_index(index_key, embedder.dimension())
            .await
            .map_err(|source| PipelineError::Construction {
                component: "vector index",
                source,
            })?;
        let index_name = index.name().to_string();

        let spec = IndexSpec {
            name: index_name.clone(),
            dimension: embedder.dimension(),
            metric: Metric::Cosine,
        };
        match index.create_index(&spec).await {
            Ok(IndexCreation::Created) => tracing::info!("Created vector index '{}'", index_name),
            Ok(IndexCreation::AlreadyExists) => {
                tracing::info!("Vector index '{}' already exists", index_name)
            }
            Err(source) => {
                return Err(PipelineError::IndexCreation {
                    index: index_name,
                    source,
                })
            }
        }

        let ingestor = Ingestor::new(
            self.splitter,
            Arc::clone(&embedder),
            Arc::clone(&index),
            settings.embedding.batch_size,
            settings.embedding.concurrency,
        );

        match index.inspect().await {
            Ok(IndexState::Populated { vector_count }) => {
                tracing::info!(
                    "Binding to vector index '{}' ({} vectors)",
                    index_name,
                    vector_count
                );
            }
            Ok(IndexState::Empty) => {
                let documents = self.seed_corpus().await;
                tracing::info!(
                    "Vector index '{}' is empty; seeding {} document(s)",
                    index_name,
                    documents.len()
                );
                ingestor
                    .ingest(&documents)
                    .await
                    .map_err(PipelineError::Ingestion)?;
            }
            Err(source) => {
                return Err(PipelineError::IndexUnavailable {
                    index: index_name,
                    source,
                })
            }
        }

        let retriever = Arc::new(Retriever::new(embedder, index, settings.rag.top_k));
        let synthesizer = Arc::new(AnswerSynthesizer::new(model, &settings.llm));

        tracing::info!(
            "Pipeline ready (model '{}', index '{}')",
            synthesizer.model_id(),
            index_name
        );
        Ok(ReadyPipeline {
            retriever,
            synthesizer,
            ingestor,
            index_name,
        })
    }

    /// PDFs from the configured data directory, or the built-in entries when
    /// there are none.
    async fn seed_corpus(&self) -> Vec<Document> {
        if let Some(dir) = self.settings.rag.data_dir.as_deref() {
            match load_pdf_directory(dir).await {
                Ok(loaded) if !loaded.documents.is_empty() => return loaded.documents,
                Ok(_) => tracing::warn!(
                    "No usable PDFs in {}; using built-in seed documents",
                    dir.display()
                ),
                Err(err) => tracing::warn!("{:#}; using built-in seed documents", err),
            }
        }
        seed_documents()
    }

    /// Fallible question answering.
    pub async fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let ready = self.initialize().await?;
        tokio::time::timeout(self.ask_timeout, ready.respond(question))
            .await
            .map_err(|_| PipelineError::Timeout(self.ask_timeout))?
    }

    /// Never fails: errors come back as an apology the user can read.
    pub async fn ask(&self, question: &str) -> String {
        match self.answer(question).await {
            Ok(answer) => answer.text,
            Err(err) => {
                tracing::error!("Failed to answer question: {}", err);
                apology(err)
            }
        }
    }

    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport, PipelineError> {
        let ready = self.initialize().await?;
        ready
            .ingestor
            .ingest(documents)
            .await
            .map_err(PipelineError::Ingestion)
    }

    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, PipelineError> {
        let loaded = load_pdf_directory(dir)
            .await
            .map_err(PipelineError::DocumentLoad)?;
        for (path, reason) in &loaded.skipped {
            tracing::warn!("Skipped {}: {}", path.display(), reason);
        }
        self.ingest(&loaded.documents).await
    }

    /// Does not touch the network.
    pub fn status(&self) -> PipelineStatus {
        let ready = self.ready.get();
        PipelineStatus {
            gemini_api_key: presence(self.settings.credentials.has_llm_api_key()),
            pinecone_api_key: presence(self.settings.credentials.has_index_api_key()),
            initialized: ready.is_some(),
            state: self.state().as_str(),
            model: ready.map(|r| r.model_id().to_string()),
            index_name: ready
                .map(|r| r.index_name().to_string())
                .unwrap_or_else(|| self.settings.vector_index.index_name.clone()),
        }
    }
}
