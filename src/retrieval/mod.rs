//! Retrieval stages: dense search, fusion, rerank, dedup, case expansion

pub mod dedup;
pub mod dense;
pub mod expand;
pub mod fusion;
pub mod rerank;

pub use dedup::{dedup_candidates, dedup_documents};
pub use dense::{DenseOutcome, DenseSearchAdapter};
pub use expand::CaseExpander;
pub use fusion::{fuse_candidates, ChannelWeights, FusionStrategy};
pub use rerank::{admit_for_rerank, Reranker};
