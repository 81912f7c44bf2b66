//! Process-wide BM25 inverted index (global sparse mode)
//!
//! Built once at startup from the full corpus of a collection; read-only for
//! the process lifetime, so concurrent requests query it without locking.

use super::bm25::Bm25Params;
use crate::document::{Collection, Document};
use crate::format::truncate_chars;
use crate::tokenize::Tokenizer;
use ahash::AHashMap;

/// Inverted index over one collection
pub struct InvertedIndex {
    docs: Vec<Document>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    /// postings[term] = (doc index, term frequency)
    postings: AHashMap<String, Vec<(u32, u32)>>,
    idf: AHashMap<String, f64>,
    params: Bm25Params,
}

impl InvertedIndex {
    /// Build from the full corpus of a collection
    ///
    /// Duplicate documents (same dedup key) are dropped before indexing.
    /// Document bodies are truncated to `max_doc_chars` before tokenization.
    pub fn build(
        docs: Vec<Document>,
        tokenizer: &dyn Tokenizer,
        params: Bm25Params,
        max_doc_chars: usize,
    ) -> Self {
        let mut seen: AHashMap<String, ()> = AHashMap::new();
        let docs: Vec<Document> = docs
            .into_iter()
            .filter(|d| seen.insert(d.dedup_key(), ()).is_none())
            .collect();

        let mut postings: AHashMap<String, Vec<(u32, u32)>> = AHashMap::new();
        let mut df: AHashMap<String, u32> = AHashMap::new();
        let mut doc_lens = Vec::with_capacity(docs.len());

        for (idx, doc) in docs.iter().enumerate() {
            let terms = tokenizer.tokenize(&truncate_chars(&doc.text, max_doc_chars));
            doc_lens.push(terms.len());

            let mut tf: AHashMap<&str, u32> = AHashMap::new();
            for term in &terms {
                *tf.entry(term.as_str()).or_insert(0) += 1;
            }
            for (term, f) in tf {
                postings
                    .entry(term.to_string())
                    .or_default()
                    .push((idx as u32, f));
                *df.entry(term.to_string()).or_insert(0) += 1;
            }
        }

        let n = docs.len();
        let avgdl = if n == 0 {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / n as f64
        };

        let idf = df
            .into_iter()
            .map(|(term, dfi)| {
                let dfi = dfi as f64;
                (term, (1.0 + (n as f64 - dfi + 0.5) / (dfi + 0.5)).ln())
            })
            .collect();

        Self {
            docs,
            doc_lens,
            avgdl,
            postings,
            idf,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Top-k documents for a tokenized query, best first
    ///
    /// Ties break on document id so identical inputs always produce the same
    /// ordering.
    pub fn search(&self, query_terms: &[String], top_k: usize) -> Vec<(Document, f64)> {
        if self.is_empty() || query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut qtf: AHashMap<&str, u32> = AHashMap::new();
        for term in query_terms {
            *qtf.entry(term.as_str()).or_insert(0) += 1;
        }

        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };
        let mut scores: AHashMap<u32, f64> = AHashMap::new();
        for (term, qf) in qtf {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf.get(term).copied().unwrap_or(0.0);
            if idf == 0.0 {
                continue;
            }
            let boost = 1.0 + 0.1 * (qf as f64 - 1.0);
            for (doc_idx, f) in postings {
                let dl = self.doc_lens[*doc_idx as usize] as f64;
                let norm = (1.0 - self.params.b) + self.params.b * (dl / avgdl);
                let f = *f as f64;
                let denom = f + self.params.k1 * norm;
                if denom <= 0.0 {
                    continue;
                }
                *scores.entry(*doc_idx).or_insert(0.0) +=
                    idf * (f * (self.params.k1 + 1.0) / denom) * boost;
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.docs[a.0 as usize].id.cmp(&self.docs[b.0 as usize].id))
        });
        ranked.truncate(top_k);
        ranked
            .into_iter()
            .map(|(idx, score)| (self.docs[idx as usize].clone(), score))
            .collect()
    }
}

/// The per-collection global indexes, built once at startup
#[derive(Default)]
pub struct SparseIndexSet {
    law: Option<InvertedIndex>,
    rule: Option<InvertedIndex>,
    case: Option<InvertedIndex>,
}

impl SparseIndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Collection, index: InvertedIndex) {
        tracing::info!(
            collection = %collection,
            docs = index.len(),
            "global BM25 index built"
        );
        match collection {
            Collection::Law => self.law = Some(index),
            Collection::Rule => self.rule = Some(index),
            Collection::Case => self.case = Some(index),
        }
    }

    pub fn get(&self, collection: Collection) -> Option<&InvertedIndex> {
        let index = match collection {
            Collection::Law => self.law.as_ref(),
            Collection::Rule => self.rule.as_ref(),
            Collection::Case => self.case.as_ref(),
        };
        index.filter(|i| !i.is_empty())
    }
}
