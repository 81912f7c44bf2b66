//! Dense retrieval adapter over the external embedding and vector services
//!
//! A failed or timed-out search degrades the collection to zero dense
//! candidates; it never aborts the request on its own.

use crate::document::{Candidate, Collection};
use crate::services::{QueryEmbedder, ServiceError, VectorSearch};
use std::sync::Arc;
use std::time::Duration;

/// Dense candidates for one collection plus the malformed-record count
#[derive(Debug, Default)]
pub struct DenseOutcome {
    pub candidates: Vec<Candidate>,
    pub malformed: usize,
}

/// Per-collection nearest-neighbor query with timeout handling
pub struct DenseSearchAdapter {
    embedder: Arc<dyn QueryEmbedder>,
    index: Arc<dyn VectorSearch>,
    embed_timeout: Duration,
    search_timeout: Duration,
}

impl DenseSearchAdapter {
    pub fn new(
        embedder: Arc<dyn QueryEmbedder>,
        index: Arc<dyn VectorSearch>,
        embed_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            embed_timeout,
            search_timeout,
        }
    }

    /// Embed the query once per request
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ServiceError> {
        tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| ServiceError::Timeout(self.embed_timeout))?
    }

    /// Up to `top_k` candidates ordered by similarity, 1-based dense ranks
    ///
    /// Malformed hits (missing id/title/text) are skipped and counted; ranks
    /// cover the kept hits only.
    pub async fn search(
        &self,
        embedding: &[f32],
        collection: Collection,
        top_k: usize,
    ) -> Result<DenseOutcome, ServiceError> {
        let hits = tokio::time::timeout(
            self.search_timeout,
            self.index.search(embedding, collection, top_k),
        )
        .await
        .map_err(|_| ServiceError::Timeout(self.search_timeout))??;

        let mut outcome = DenseOutcome::default();
        for hit in hits {
            let score = hit.score;
            match hit.into_document() {
                Ok(doc) => {
                    let rank = outcome.candidates.len() + 1;
                    outcome
                        .candidates
                        .push(Candidate::from_dense(doc, rank, score));
                }
                Err(reason) => {
                    outcome.malformed += 1;
                    tracing::warn!(
                        index = collection.index_name(),
                        "skipping malformed hit: {reason}"
                    );
                }
            }
        }
        tracing::debug!(
            index = collection.index_name(),
            candidates = outcome.candidates.len(),
            malformed = outcome.malformed,
            "dense search complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceType;
    use crate::services::DenseHit;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl QueryEmbedder for StubEmbedder {
        async fn embed(&self, _query: &str) -> Result<Vec<f32>, ServiceError> {
            Ok(vec![0.1, 0.2])
        }
    }

    struct StubIndex {
        hits: Vec<DenseHit>,
    }

    #[async_trait]
    impl VectorSearch for StubIndex {
        async fn search(
            &self,
            _embedding: &[f32],
            _collection: Collection,
            _top_k: usize,
        ) -> Result<Vec<DenseHit>, ServiceError> {
            Ok(self.hits.clone())
        }
    }

    struct HangingIndex;

    #[async_trait]
    impl VectorSearch for HangingIndex {
        async fn search(
            &self,
            _embedding: &[f32],
            _collection: Collection,
            _top_k: usize,
        ) -> Result<Vec<DenseHit>, ServiceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn hit(id: &str, text: &str) -> DenseHit {
        DenseHit {
            id: id.to_string(),
            chunk_id: Some(format!("{id}-0")),
            source_type: SourceType::Law,
            src_title: "주택임대차보호법".to_string(),
            article: "제3조".to_string(),
            text: text.to_string(),
            priority: 1,
            case_no: None,
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn assigns_ranks_and_skips_malformed() {
        let mut broken = hit("b", "본문");
        broken.text = String::new();
        let adapter = DenseSearchAdapter::new(
            Arc::new(StubEmbedder),
            Arc::new(StubIndex {
                hits: vec![hit("a", "본문"), broken, hit("c", "본문")],
            }),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let emb = adapter.embed_query("질문").await.unwrap();
        let outcome = adapter.search(&emb, Collection::Law, 10).await.unwrap();
        assert_eq!(outcome.malformed, 1);
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].dense_rank, Some(1));
        assert_eq!(outcome.candidates[1].dense_rank, Some(2));
        assert_eq!(outcome.candidates[1].doc.id, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn search_timeout_is_a_service_error() {
        let adapter = DenseSearchAdapter::new(
            Arc::new(StubEmbedder),
            Arc::new(HangingIndex),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        let err = adapter.search(&[0.0], Collection::Rule, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
    }
}
