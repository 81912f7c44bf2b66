//! External collaborator boundaries
//!
//! Every network-backed dependency of the pipeline (query embedding, vector
//! search, cross-encoder rerank, case full-text lookup, morphological
//! analysis) lives behind a trait here. Implementations are thread-safe
//! clients injected at startup; the pipeline never constructs them.

use crate::document::{Collection, Document, SourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single external call
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service call timed out after {0:?}")]
    Timeout(Duration),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed service response: {0}")]
    Malformed(String),
}

fn default_priority() -> u32 {
    99
}

/// Wire record returned by the vector search service
///
/// Field validation happens in the dense adapter: records missing `id`,
/// `src_title`, or `text` are skipped and counted, never propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseHit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub chunk_id: Option<String>,
    pub source_type: SourceType,
    #[serde(default)]
    pub src_title: String,
    #[serde(default)]
    pub article: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub case_no: Option<String>,
    /// Similarity score, best first
    #[serde(default)]
    pub score: f64,
}

impl DenseHit {
    /// Validate required fields and convert to a Document
    pub fn into_document(self) -> std::result::Result<Document, String> {
        if self.id.is_empty() {
            return Err("missing id".to_string());
        }
        if self.src_title.is_empty() {
            return Err(format!("document {}: missing src_title", self.id));
        }
        if self.text.is_empty() {
            return Err(format!("document {}: missing text", self.id));
        }
        Ok(Document {
            id: self.id,
            chunk_id: self.chunk_id,
            source_type: self.source_type,
            src_title: self.src_title,
            article: self.article,
            text: self.text,
            priority: self.priority,
            case_no: self.case_no,
        })
    }
}

/// Query embedding service
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, query: &str) -> std::result::Result<Vec<f32>, ServiceError>;
}

/// Per-collection nearest-neighbor search service
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Returns up to `top_k` hits ordered by similarity, best first
    async fn search(
        &self,
        embedding: &[f32],
        collection: Collection,
        top_k: usize,
    ) -> std::result::Result<Vec<DenseHit>, ServiceError>;
}

/// Cross-encoder rerank service
#[async_trait]
pub trait RerankService: Send + Sync {
    /// Returns one relevance score per document, aligned by position
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> std::result::Result<Vec<f64>, ServiceError>;
}

/// Full opinion text lookup by case number
#[async_trait]
pub trait CaseFullText: Send + Sync {
    /// `Ok(None)` means the case number is unknown to the store
    async fn full_text(
        &self,
        case_no: &str,
    ) -> std::result::Result<Option<String>, ServiceError>;
}

/// A single morpheme from the external analyzer
#[derive(Debug, Clone)]
pub struct Morpheme {
    pub form: String,
    /// POS tag in the analyzer's tagset (NNG, NNP, VV, ...)
    pub tag: String,
}

/// External Korean morphological analyzer
///
/// Optional: when absent or failing the startup probe, tokenization falls
/// back to the regex strategy for the process lifetime.
pub trait MorphAnalyzer: Send + Sync {
    fn morphemes(&self, text: &str) -> anyhow::Result<Vec<Morpheme>>;
}
