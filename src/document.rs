//! Evidence document model shared across the pipeline stages

use serde::{Deserialize, Serialize};

/// Legal origin of an evidence unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Statute (법령)
    Law,
    /// Regulation / enforcement rule (규정)
    Rule,
    /// Court decision (판례)
    Case,
    /// OCR excerpt of the user's own contract
    UserContract,
}

/// One of the three searchable document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Law,
    Rule,
    Case,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Law, Collection::Rule, Collection::Case];

    /// Name of the backing vector index for this collection
    pub fn index_name(&self) -> &'static str {
        match self {
            Collection::Law => "law-index",
            Collection::Rule => "rule-index",
            Collection::Case => "case-index",
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Collection::Law => SourceType::Law,
            Collection::Rule => SourceType::Rule,
            Collection::Case => SourceType::Case,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collection::Law => write!(f, "law"),
            Collection::Rule => write!(f, "rule"),
            Collection::Case => write!(f, "case"),
        }
    }
}

/// Immutable evidence unit
///
/// Owned by the external index stores; the pipeline creates these fresh per
/// request from wire records and discards them after response assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identity within its source
    pub id: String,
    /// Sub-identity when the source was chunked
    pub chunk_id: Option<String>,
    pub source_type: SourceType,
    /// Statute / regulation / decision title (e.g. "주택임대차보호법")
    pub src_title: String,
    /// Article or clause label within the source (e.g. "제3조")
    pub article: String,
    pub text: String,
    /// Legal precedence; lower = higher authority within its tier
    pub priority: u32,
    /// Court case number, present only for case law
    pub case_no: Option<String>,
}

impl Document {
    /// Identity key for deduplication: chunk_id when present, id otherwise
    pub fn dedup_key(&self) -> String {
        match &self.chunk_id {
            Some(c) if !c.is_empty() => format!("chunk:{c}"),
            _ => format!("id:{}", self.id),
        }
    }
}

/// A document paired with its per-channel ranks and fused score
///
/// A `None` rank means the document did not appear in that channel's top
/// results; fusion treats absence per strategy, never as rank zero.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub doc: Document,
    pub dense_rank: Option<usize>,
    pub bm25_text_rank: Option<usize>,
    pub bm25_title_rank: Option<usize>,
    pub dense_score: Option<f64>,
    pub bm25_text_score: Option<f64>,
    pub bm25_title_score: Option<f64>,
    pub fused_score: f64,
    /// First-appearance ordinal across channels (dense, then text, then
    /// title); the deterministic tie-break for fusion.
    pub first_seen: usize,
}

impl Candidate {
    /// Candidate surfaced by dense search with a 1-based rank
    pub fn from_dense(doc: Document, rank: usize, score: f64) -> Self {
        Self {
            doc,
            dense_rank: Some(rank),
            bm25_text_rank: None,
            bm25_title_rank: None,
            dense_score: Some(score),
            bm25_text_score: None,
            bm25_title_score: None,
            fused_score: 0.0,
            first_seen: rank - 1,
        }
    }

    /// Candidate surfaced only by the sparse channel
    pub fn from_sparse(doc: Document, first_seen: usize) -> Self {
        Self {
            doc,
            dense_rank: None,
            bm25_text_rank: None,
            bm25_title_rank: None,
            dense_score: None,
            bm25_text_score: None,
            bm25_title_score: None,
            fused_score: 0.0,
            first_seen,
        }
    }
}

/// Which priority bucket consumed a rerank budget slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotGroup {
    /// Law or rule document, admitted first
    Statutory,
    /// Case document, fills remaining budget
    CaseLaw,
}

/// A candidate scored by the external cross-encoder
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    pub candidate: Candidate,
    pub rerank_score: f64,
    pub slot_group: SlotGroup,
}
