use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to set up RAG pipeline: {0}")]
    Pipeline(#[source] anyhow::Error),
}
