use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};

use super::chunker::{segment_id, ChunkSplitter};
use super::document::Document;
use super::embedding::EmbeddingProvider;
use super::store::{VectorIndex, VectorRecord};
use crate::core::errors::ProviderError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub segments: usize,
    pub upserted: usize,
}

struct PendingSegment {
    id: String,
    text: String,
    source: String,
    metadata: Value,
}

impl PendingSegment {
    fn into_record(self, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: self.id,
            values,
            text: self.text,
            source: self.source,
            metadata: Some(self.metadata),
        }
    }
}

/// Chunks documents, embeds the segments in batches and writes them to the index.
pub struct Ingestor {
    splitter: ChunkSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        splitter: ChunkSplitter,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            splitter,
            embedder,
            index,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    fn pending_segments(&self, documents: &[Document]) -> Vec<PendingSegment> {
        documents
            .iter()
            .flat_map(|document| {
                self.splitter
                    .split(document)
                    .filter(|segment| !segment.text.trim().is_empty())
                    .map(move |segment| {
                        let mut metadata = match &document.metadata {
                            Value::Object(map) => map.clone(),
                            _ => Default::default(),
                        };
                        metadata.insert("chunk_index".to_string(), json!(segment.index));
                        metadata.insert("char_start".to_string(), json!(segment.char_start));
                        PendingSegment {
                            id: segment_id(&document.source, segment.index),
                            text: segment.text,
                            source: document.source.clone(),
                            metadata: Value::Object(metadata),
                        }
                    })
            })
            .collect()
    }

    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport, ProviderError> {
        let pending = self.pending_segments(documents);
        let mut report = IngestReport {
            documents: documents.len(),
            segments: pending.len(),
            upserted: 0,
        };
        if pending.is_empty() {
            return Ok(report);
        }

        let mut batches: Vec<Vec<PendingSegment>> = Vec::new();
        let mut pending = pending.into_iter().peekable();
        while pending.peek().is_some() {
            batches.push(pending.by_ref().take(self.batch_size).collect());
        }
        let batch_count = batches.len();

        let mut embedded = stream::iter(batches.into_iter().map(|batch| {
            let embedder = Arc::clone(&self.embedder);
            async move {
                let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
                let vectors = embedder.embed(&texts).await?;
                Ok::<_, ProviderError>(
                    batch
                        .into_iter()
                        .zip(vectors)
                        .map(|(segment, values)| segment.into_record(values))
                        .collect::<Vec<_>>(),
                )
            }
        }))
        .buffered(self.concurrency);

        let mut done = 0;
        while let Some(records) = embedded.next().await {
            report.upserted += self.index.upsert(records?).await?;
            done += 1;
            tracing::debug!("Ingested batch {}/{}", done, batch_count);
        }

        tracing::info!(
            "Ingested {} segment(s) from {} document(s) into '{}'",
            report.upserted,
            report.documents,
            self.index.name()
        );
        Ok(report)
    }
}
