//! Offline fixture backends for the `ask` command
//!
//! Stand-ins for the production embedding, vector-search, rerank, and case
//! full-text services, all derived from a local JSONL corpus. They keep the
//! pipeline runnable on a laptop with no network backends; retrieval quality
//! is deliberately crude.

use crate::document::Collection;
use crate::error::{LexError, Result};
use crate::services::{
    CaseFullText, DenseHit, QueryEmbedder, RerankService, ServiceError, VectorSearch,
};
use crate::tokenize::Tokenizer;
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

const EMBEDDING_DIM: usize = 256;

/// Load a corpus from a JSON Lines file, one document record per line
pub fn load_corpus(path: &Path) -> Result<Vec<DenseHit>> {
    let content = std::fs::read_to_string(path).map_err(|e| LexError::Io {
        source: e,
        context: format!("Failed to read corpus file: {:?}", path),
    })?;

    let mut hits = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let hit: DenseHit = serde_json::from_str(line).map_err(|e| LexError::Json {
            source: e,
            context: format!("corpus line {}", lineno + 1),
        })?;
        hits.push(hit);
    }
    tracing::info!(docs = hits.len(), "corpus loaded");
    Ok(hits)
}

/// Token feature-hashing into a fixed-dimension L2-normalized vector
fn embed_text(tokenizer: &dyn Tokenizer, text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for term in tokenizer.tokenize(text) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        term.hash(&mut hasher);
        vector[(hasher.finish() as usize) % EMBEDDING_DIM] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Query embedder backed by the same feature hashing as the fixture index
pub struct HashingEmbedder {
    tokenizer: Arc<dyn Tokenizer>,
}

impl HashingEmbedder {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

#[async_trait]
impl QueryEmbedder for HashingEmbedder {
    async fn embed(&self, query: &str) -> std::result::Result<Vec<f32>, ServiceError> {
        Ok(embed_text(self.tokenizer.as_ref(), query))
    }
}

/// In-memory cosine-similarity index over the corpus
pub struct FixtureIndex {
    entries: Vec<(DenseHit, Vec<f32>)>,
}

impl FixtureIndex {
    pub fn build(corpus: &[DenseHit], tokenizer: &dyn Tokenizer) -> Self {
        let entries = corpus
            .iter()
            .map(|hit| {
                let body = format!("{} {}", hit.src_title, hit.text);
                (hit.clone(), embed_text(tokenizer, &body))
            })
            .collect();
        Self { entries }
    }
}

#[async_trait]
impl VectorSearch for FixtureIndex {
    async fn search(
        &self,
        embedding: &[f32],
        collection: Collection,
        top_k: usize,
    ) -> std::result::Result<Vec<DenseHit>, ServiceError> {
        let source_type = collection.source_type();
        let mut scored: Vec<(f64, &DenseHit)> = self
            .entries
            .iter()
            .filter(|(hit, _)| hit.source_type == source_type)
            .map(|(hit, vector)| {
                let dot: f32 = vector.iter().zip(embedding).map(|(a, b)| a * b).sum();
                (dot as f64, hit)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, hit)| {
                let mut hit = hit.clone();
                hit.score = score;
                hit
            })
            .collect())
    }
}

/// Term-overlap rerank scorer
pub struct LexicalRerank {
    tokenizer: Arc<dyn Tokenizer>,
}

impl LexicalRerank {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

#[async_trait]
impl RerankService for LexicalRerank {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> std::result::Result<Vec<f64>, ServiceError> {
        let query_terms: AHashSet<String> =
            self.tokenizer.tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(vec![0.0; documents.len()]);
        }
        Ok(documents
            .iter()
            .map(|doc| {
                let doc_terms: AHashSet<String> =
                    self.tokenizer.tokenize(doc).into_iter().collect();
                let overlap = query_terms.intersection(&doc_terms).count();
                overlap as f64 / query_terms.len() as f64
            })
            .collect())
    }
}

/// Case full-text store assembled from the corpus chunks
pub struct FixtureCaseStore {
    full_texts: AHashMap<String, String>,
}

impl FixtureCaseStore {
    /// Concatenates every chunk of a case number in corpus order
    pub fn build(corpus: &[DenseHit]) -> Self {
        let mut full_texts: AHashMap<String, String> = AHashMap::new();
        for hit in corpus {
            let Some(case_no) = &hit.case_no else {
                continue;
            };
            if case_no.is_empty() || hit.text.is_empty() {
                continue;
            }
            let entry = full_texts.entry(case_no.clone()).or_default();
            if !entry.is_empty() {
                entry.push('\n');
            }
            entry.push_str(&hit.text);
        }
        Self { full_texts }
    }
}

#[async_trait]
impl CaseFullText for FixtureCaseStore {
    async fn full_text(
        &self,
        case_no: &str,
    ) -> std::result::Result<Option<String>, ServiceError> {
        Ok(self.full_texts.get(case_no).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceType;
    use crate::tokenize::RegexTokenizer;

    fn hit(id: &str, source_type: SourceType, text: &str, case_no: Option<&str>) -> DenseHit {
        DenseHit {
            id: id.to_string(),
            chunk_id: Some(format!("{id}-0")),
            source_type,
            src_title: "주택임대차보호법".to_string(),
            article: "제3조".to_string(),
            text: text.to_string(),
            priority: 1,
            case_no: case_no.map(str::to_string),
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn fixture_index_matches_keyword_overlap() {
        let tokenizer = RegexTokenizer::new(1);
        let corpus = vec![
            hit("a", SourceType::Law, "보증금 반환 의무", None),
            hit("b", SourceType::Law, "차임 증액 한도", None),
            hit("c", SourceType::Case, "보증금 반환 판결", Some("2023다1")),
        ];
        let index = FixtureIndex::build(&corpus, &tokenizer);
        let query = embed_text(&tokenizer, "보증금 반환");

        let hits = index.search(&query, Collection::Law, 10).await.unwrap();
        assert_eq!(hits[0].id, "a");
        // Case documents never leak into the law collection
        assert!(hits.iter().all(|h| h.source_type == SourceType::Law));
    }

    #[tokio::test]
    async fn case_store_concatenates_chunks() {
        let corpus = vec![
            hit("c1", SourceType::Case, "판시사항", Some("2023다1")),
            hit("c2", SourceType::Case, "판결이유", Some("2023다1")),
        ];
        let store = FixtureCaseStore::build(&corpus);
        let text = store.full_text("2023다1").await.unwrap().unwrap();
        assert_eq!(text, "판시사항\n판결이유");
        assert!(store.full_text("없음").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lexical_rerank_scores_overlap() {
        let rerank = LexicalRerank::new(Arc::new(RegexTokenizer::new(1)));
        let scores = rerank
            .rerank(
                "보증금 반환",
                &["보증금 반환 청구".to_string(), "차임 연체".to_string()],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }
}
