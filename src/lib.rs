//! Lexlease - Korean residential lease law evidence retrieval
//!
//! A hybrid retrieval pipeline that fans a question out over dense vector
//! search and BM25 sparse scoring across statute, regulation, and case-law
//! collections, fuses the per-channel rankings, reranks under a
//! priority-tier budget, and assembles a hierarchically sectioned evidence
//! block with a citation list.

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod retrieval;
pub mod services;
pub mod sparse;
pub mod tokenize;

pub use error::{LexError, Result};
