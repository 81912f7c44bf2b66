//! Order-preserving deduplication by evidence identity

use crate::document::{Candidate, Document};
use ahash::AHashSet;

fn dedup_by_key<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen: AHashSet<String> = AHashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Keep the first occurrence of each chunk (falling back to document id)
///
/// Later duplicates are dropped regardless of score. Idempotent.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    dedup_by_key(candidates, |c| c.doc.dedup_key())
}

/// Same pass over bare documents (used after rerank/fallback selection)
pub fn dedup_documents(docs: Vec<Document>) -> Vec<Document> {
    dedup_by_key(docs, Document::dedup_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceType;

    fn doc(id: &str, chunk: &str) -> Document {
        Document {
            id: id.to_string(),
            chunk_id: Some(chunk.to_string()),
            source_type: SourceType::Law,
            src_title: "제목".to_string(),
            article: "제1조".to_string(),
            text: "본문".to_string(),
            priority: 1,
            case_no: None,
        }
    }

    #[test]
    fn keeps_first_occurrence_only() {
        let docs = vec![doc("a", "a-1"), doc("b", "b-1"), doc("a2", "a-1")];
        let out = dedup_documents(docs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[1].id, "b");
    }

    #[test]
    fn is_idempotent() {
        let docs = vec![doc("a", "a-1"), doc("a2", "a-1"), doc("b", "b-1")];
        let once = dedup_documents(docs);
        let twice = dedup_documents(once.clone());
        assert_eq!(
            once.iter().map(|d| &d.id).collect::<Vec<_>>(),
            twice.iter().map(|d| &d.id).collect::<Vec<_>>()
        );
        // No two outputs share a chunk_id
        let mut chunks: Vec<_> = twice.iter().filter_map(|d| d.chunk_id.clone()).collect();
        chunks.sort();
        chunks.dedup();
        assert_eq!(chunks.len(), twice.len());
    }
}
