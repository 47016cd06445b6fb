use std::time::Duration;

use thiserror::Error;

use super::chunker::ChunkConfigError;
use crate::core::errors::ProviderError;
use crate::llm::ModelSelectionError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} is not set; export it or add it to secrets.yaml")]
    MissingCredential(&'static str),

    #[error(transparent)]
    ModelSelection(#[from] ModelSelectionError),

    #[error("Failed to construct {component}: {source}")]
    Construction {
        component: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to create vector index '{index}': {source}")]
    IndexCreation {
        index: String,
        #[source]
        source: ProviderError,
    },

    #[error("Vector index '{index}' is unreachable: {source}")]
    IndexUnavailable {
        index: String,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to ingest documents: {0}")]
    Ingestion(#[source] ProviderError),

    #[error("Failed to load documents: {0}")]
    DocumentLoad(#[source] anyhow::Error),

    #[error("Invalid chunking parameters: {0}")]
    Chunking(#[from] ChunkConfigError),

    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Failed to retrieve context: {0}")]
    Retrieval(#[source] ProviderError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}
