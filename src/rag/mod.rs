//! Retrieval-augmented answering over a medical corpus.
//!
//! - `chunker` / `document`: corpus loading and fixed-window segmentation
//! - `embedding`, `store` (+ `pinecone`, `sqlite`): the capability seams
//! - `retriever`, `synthesizer`, `ingest`: the per-request building blocks
//! - `pipeline`: lazy single-flight assembly of all of the above

pub mod chunker;
pub mod document;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod pinecone;
pub mod pipeline;
pub mod retriever;
pub mod sqlite;
pub mod store;
pub mod synthesizer;

pub use chunker::{segment_id, ChunkConfigError, ChunkSplitter, Segment};
pub use document::{load_pdf_directory, seed_documents, Document, LoadedDocuments};
pub use embedding::{EmbeddingProvider, HuggingFaceEmbedder};
pub use error::PipelineError;
pub use ingest::{IngestReport, Ingestor};
pub use pinecone::PineconeIndex;
pub use pipeline::{
    apology, Answer, ComponentFactory, HostedComponents, PipelineState, PipelineStatus,
    RagPipeline, ReadyPipeline,
};
pub use retriever::{RetrievedSegment, Retriever};
pub use sqlite::SqliteVectorIndex;
pub use store::{
    IndexCreation, IndexSpec, IndexState, Metric, ScoredRecord, VectorIndex, VectorRecord,
};
pub use synthesizer::{AnswerSynthesizer, UNAVAILABLE_ANSWER};
