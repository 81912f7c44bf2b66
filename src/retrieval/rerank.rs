//! Budgeted cross-encoder reranking
//!
//! The slot policy admits law and rule documents first, in fused order, up to
//! the budget; case documents only fill what remains. A rerank service
//! failure falls back to the admitted set in fused order.

use crate::document::{Candidate, RerankedCandidate, SlotGroup};
use crate::format::truncate_chars;
use crate::services::{RerankService, ServiceError};
use std::sync::Arc;
use std::time::Duration;

/// Select the rerank input under the priority-tier slot policy
///
/// Never returns more than `budget` entries. When law + rule alone reach the
/// budget, case documents get zero slots.
pub fn admit_for_rerank(
    law: Vec<Candidate>,
    rule: Vec<Candidate>,
    case: Vec<Candidate>,
    budget: usize,
) -> Vec<(Candidate, SlotGroup)> {
    let mut admitted: Vec<(Candidate, SlotGroup)> = law
        .into_iter()
        .chain(rule)
        .take(budget)
        .map(|c| (c, SlotGroup::Statutory))
        .collect();

    let remaining = budget.saturating_sub(admitted.len());
    admitted.extend(
        case.into_iter()
            .take(remaining)
            .map(|c| (c, SlotGroup::CaseLaw)),
    );
    admitted
}

/// Invokes the external cross-encoder and orders by its scores
pub struct Reranker {
    service: Arc<dyn RerankService>,
    timeout: Duration,
    doc_max_chars: usize,
    threshold: f64,
    /// When nothing clears the threshold, keep this many top entries instead
    fallback_top: usize,
}

impl Reranker {
    pub fn new(
        service: Arc<dyn RerankService>,
        timeout: Duration,
        doc_max_chars: usize,
        threshold: f64,
        fallback_top: usize,
    ) -> Self {
        Self {
            service,
            timeout,
            doc_max_chars,
            threshold,
            fallback_top,
        }
    }

    /// Score the admitted set and sort descending by relevance
    ///
    /// Errors (including timeout) leave the caller to fall back to the fused
    /// order; this method never partially applies scores.
    pub async fn rerank(
        &self,
        query: &str,
        admitted: Vec<(Candidate, SlotGroup)>,
    ) -> Result<Vec<RerankedCandidate>, ServiceError> {
        if admitted.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = admitted
            .iter()
            .map(|(c, _)| truncate_chars(&c.doc.text, self.doc_max_chars))
            .collect();

        let scores = tokio::time::timeout(self.timeout, self.service.rerank(query, &texts))
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))??;

        if scores.len() != texts.len() {
            return Err(ServiceError::Malformed(format!(
                "expected {} scores, got {}",
                texts.len(),
                scores.len()
            )));
        }

        let mut reranked: Vec<RerankedCandidate> = admitted
            .into_iter()
            .zip(scores)
            .map(|((candidate, slot_group), rerank_score)| RerankedCandidate {
                candidate,
                rerank_score,
                slot_group,
            })
            .collect();

        // Stable sort: equal scores keep the admitted (fused) order
        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let passing = reranked
            .iter()
            .take_while(|r| r.rerank_score >= self.threshold)
            .count();
        if passing > 0 {
            reranked.truncate(passing);
        } else {
            reranked.truncate(self.fallback_top.min(reranked.len()));
        }
        tracing::debug!(selected = reranked.len(), "rerank complete");
        Ok(reranked)
    }
}
