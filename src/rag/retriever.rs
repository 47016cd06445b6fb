use std::sync::Arc;

use serde::Serialize;

use super::embedding::EmbeddingProvider;
use super::store::VectorIndex;
use crate::core::errors::ProviderError;
use crate::vector_math::sort_by_score_desc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSegment {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Embeds a query and returns the nearest stored segments.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    /// At most `k` (default: the configured top-k) segments, highest score first.
    pub async fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<RetrievedSegment>, ProviderError> {
        let k = k.unwrap_or(self.top_k);
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query).await?;
        let matches = self.index.query(&vector, k).await?;

        let mut segments: Vec<RetrievedSegment> = matches
            .into_iter()
            .map(|record| RetrievedSegment {
                text: record.text,
                source: record.source,
                score: record.score,
            })
            .collect();

        // Hosted indexes already rank results; enforce it regardless.
        sort_by_score_desc(&mut segments, |segment| segment.score);
        segments.truncate(k);

        tracing::debug!(
            "Retrieved {} segment(s) from '{}' for query",
            segments.len(),
            self.index.name()
        );
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::{IndexCreation, IndexSpec, IndexState, ScoredRecord, VectorRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model(&self) -> &str {
            "unit"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Returns its fixed records unsorted and ignores `top_k`.
    struct SloppyIndex {
        records: Vec<ScoredRecord>,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for SloppyIndex {
        fn name(&self) -> &str {
            "sloppy"
        }

        async fn create_index(&self, _spec: &IndexSpec) -> Result<IndexCreation, ProviderError> {
            Ok(IndexCreation::AlreadyExists)
        }

        async fn inspect(&self) -> Result<IndexState, ProviderError> {
            Ok(IndexState::Populated {
                vector_count: self.records.len() as u64,
            })
        }

        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<usize, ProviderError> {
            Ok(0)
        }

        async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<ScoredRecord>, ProviderError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    fn scored(id: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            id: id.to_string(),
            text: id.to_string(),
            source: "builtin:test".to_string(),
            score,
        }
    }

    fn retriever(index: Arc<SloppyIndex>) -> Retriever {
        Retriever::new(Arc::new(UnitEmbedder), index, 3)
    }

    #[tokio::test]
    async fn results_are_bounded_and_descending() {
        let index = Arc::new(SloppyIndex {
            records: vec![
                scored("c", 0.2),
                scored("a", 0.9),
                scored("e", 0.1),
                scored("b", 0.5),
                scored("d", 0.3),
            ],
            queries: AtomicUsize::new(0),
        });
        let retriever = retriever(index);

        let default_k = retriever.retrieve("q", None).await.unwrap();
        let texts: Vec<_> = default_k.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "d"]);

        for k in 1..=6 {
            let results = retriever.retrieve("q", Some(k)).await.unwrap();
            assert!(results.len() <= k);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn zero_k_skips_the_index() {
        let index = Arc::new(SloppyIndex {
            records: vec![scored("a", 0.9)],
            queries: AtomicUsize::new(0),
        });
        let retriever = retriever(Arc::clone(&index));

        assert!(retriever.retrieve("q", Some(0)).await.unwrap().is_empty());
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
    }
}
