//! Sparse (BM25) scoring over two channels: body text and title
//!
//! `candidate` mode scores only the set dense search already surfaced;
//! `global` mode queries a process-wide inverted index built once at startup.

mod bm25;
mod inverted;

pub use bm25::{ranks_from_scores, score_candidates, Bm25Params};
pub use inverted::{InvertedIndex, SparseIndexSet};

use serde::{Deserialize, Serialize};

/// How the sparse channel obtains its candidate universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseMode {
    /// Global index when one was built for the collection, candidate otherwise
    Auto,
    /// Score only dense-surfaced candidates (bounded cost)
    Candidate,
    /// Query the process-wide inverted index (keyword-exact recall)
    Global,
}

impl SparseMode {
    /// Resolve the effective mode for one collection
    pub fn use_global(&self, index_built: bool) -> bool {
        match self {
            SparseMode::Global => true,
            SparseMode::Candidate => false,
            SparseMode::Auto => index_built,
        }
    }
}
