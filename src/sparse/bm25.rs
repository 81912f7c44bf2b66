//! Candidate-set BM25 scoring
//!
//! Okapi BM25 with a mild boost for repeated query terms. The statistics
//! (idf, average length) come from the candidate set itself, not the corpus,
//! so scores are comparable only within one request's channel.

use ahash::AHashMap;

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.8, b: 0.85 }
    }
}

fn term_frequencies(terms: &[String]) -> AHashMap<&str, u32> {
    let mut tf: AHashMap<&str, u32> = AHashMap::new();
    for term in terms {
        *tf.entry(term.as_str()).or_insert(0) += 1;
    }
    tf
}

/// BM25 score per document over a fixed candidate set
///
/// Returns one score per entry of `docs_terms`, zero when no query term
/// matches. Higher is better.
pub fn score_candidates(
    query_terms: &[String],
    docs_terms: &[Vec<String>],
    params: &Bm25Params,
) -> Vec<f64> {
    let n = docs_terms.len();
    if n == 0 {
        return Vec::new();
    }
    if query_terms.is_empty() {
        return vec![0.0; n];
    }

    let doc_lens: Vec<usize> = docs_terms.iter().map(Vec::len).collect();
    let avgdl = (doc_lens.iter().sum::<usize>() as f64 / n as f64).max(1e-9);

    // Document frequency per term within the candidate set
    let mut df: AHashMap<&str, u32> = AHashMap::new();
    for terms in docs_terms {
        let mut seen: AHashMap<&str, ()> = AHashMap::new();
        for term in terms {
            if seen.insert(term.as_str(), ()).is_none() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
    }

    let idf: AHashMap<&str, f64> = df
        .iter()
        .map(|(term, dfi)| {
            let dfi = *dfi as f64;
            (*term, (1.0 + (n as f64 - dfi + 0.5) / (dfi + 0.5)).ln())
        })
        .collect();

    let qtf = term_frequencies(query_terms);
    let mut scores = Vec::with_capacity(n);
    for (terms, dl) in docs_terms.iter().zip(&doc_lens) {
        let tf = term_frequencies(terms);
        let norm = (1.0 - params.b) + params.b * (*dl as f64 / avgdl);
        let mut score = 0.0;
        for (term, qf) in &qtf {
            let Some(f) = tf.get(term).copied() else {
                continue;
            };
            let f = f as f64;
            let denom = f + params.k1 * norm;
            if denom <= 0.0 {
                continue;
            }
            let boost = 1.0 + 0.1 * (*qf as f64 - 1.0);
            score += idf.get(term).copied().unwrap_or(0.0) * (f * (params.k1 + 1.0) / denom) * boost;
        }
        scores.push(score);
    }
    scores
}

/// 1-based ranks for a channel, best score first
///
/// A zero (or negative) score means the document did not surface in this
/// channel: it gets no rank. Ties break on document id for determinism.
pub fn ranks_from_scores(scores: &[f64], doc_ids: &[&str]) -> Vec<Option<usize>> {
    debug_assert_eq!(scores.len(), doc_ids.len());
    let mut order: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] > 0.0).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| doc_ids[a].cmp(doc_ids[b]))
    });

    let mut ranks = vec![None; scores.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = Some(rank + 1);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn matching_doc_scores_higher() {
        let query = terms("보증금 반환");
        let docs = vec![
            terms("임대인 은 보증금 반환 의무 가 있다"),
            terms("월세 차임 연체 시 계약 해지"),
        ];
        let scores = score_candidates(&query, &docs, &Bm25Params::default());
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn empty_query_yields_zero_scores() {
        let docs = vec![terms("보증금"), terms("차임")];
        let scores = score_candidates(&[], &docs, &Bm25Params::default());
        assert_eq!(scores, vec![0.0, 0.0]);
    }

    #[test]
    fn repeated_query_terms_boost() {
        let docs = vec![terms("보증금 보증금 반환")];
        let single = score_candidates(&terms("보증금"), &docs, &Bm25Params::default());
        let repeated = score_candidates(&terms("보증금 보증금"), &docs, &Bm25Params::default());
        assert!(repeated[0] > single[0]);
    }

    #[test]
    fn ranks_skip_zero_scores_and_break_ties_by_id() {
        let scores = vec![2.0, 0.0, 2.0, 1.0];
        let ids = vec!["d", "a", "b", "c"];
        let ranks = ranks_from_scores(&scores, &ids);
        // "b" wins the tie against "d" lexicographically
        assert_eq!(ranks, vec![Some(2), None, Some(1), Some(3)]);
    }
}
