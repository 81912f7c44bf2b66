//! Rank fusion: combines per-channel rankings into one fused ordering
//!
//! Three closed strategies dispatched by explicit match. Determinism is a
//! contract here: identical candidate sets and config must yield
//! byte-identical orderings, so every tie breaks on the candidate's
//! first-appearance ordinal and no unordered map reaches the sort.

use crate::document::Candidate;
use serde::{Deserialize, Serialize};

/// Fusion strategy over the (up to three) channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Reciprocal rank fusion: sum of 1/(k + rank) over present channels
    Rrf,
    /// Negated rank sum; absent channels substitute worst rank + 1
    RankSum,
    /// Weighted sum of min-max normalized channel scores
    Weighted,
}

/// Effective per-channel weights (weighted strategy only)
#[derive(Debug, Clone, Copy)]
pub struct ChannelWeights {
    pub dense: f64,
    pub text: f64,
    pub title: f64,
}

impl ChannelWeights {
    /// Split the sparse weight between text and title channels
    pub fn from_config(dense_weight: f64, sparse_weight: f64, title_ratio: f64, title_enabled: bool) -> Self {
        let title = if title_enabled {
            sparse_weight * title_ratio
        } else {
            0.0
        };
        Self {
            dense: dense_weight,
            text: sparse_weight - title,
            title,
        }
    }
}

#[derive(Clone, Copy)]
enum Channel {
    Dense,
    Text,
    Title,
}

fn rank_of(c: &Candidate, channel: Channel) -> Option<usize> {
    match channel {
        Channel::Dense => c.dense_rank,
        Channel::Text => c.bm25_text_rank,
        Channel::Title => c.bm25_title_rank,
    }
}

/// Raw channel score used by the weighted strategy; dense falls back to the
/// reciprocal rank when the service returned no score.
fn score_of(c: &Candidate, channel: Channel) -> Option<f64> {
    match channel {
        Channel::Dense => c
            .dense_score
            .or_else(|| c.dense_rank.map(|r| 1.0 / r as f64)),
        Channel::Text => c.bm25_text_score,
        Channel::Title => c.bm25_title_score,
    }
}

const CHANNELS: [Channel; 3] = [Channel::Dense, Channel::Text, Channel::Title];

/// Compute fused scores and sort candidates best-first
pub fn fuse_candidates(
    candidates: &mut Vec<Candidate>,
    strategy: FusionStrategy,
    rrf_k: u32,
    weights: ChannelWeights,
) {
    if candidates.len() <= 1 {
        return;
    }

    match strategy {
        FusionStrategy::Rrf => {
            let k = rrf_k.max(1) as f64;
            for c in candidates.iter_mut() {
                c.fused_score = CHANNELS
                    .iter()
                    .filter_map(|ch| rank_of(c, *ch))
                    .map(|rank| 1.0 / (k + rank as f64))
                    .sum();
            }
        }
        FusionStrategy::RankSum => {
            // Absent channels substitute the channel's worst rank + 1
            let substitutes: Vec<usize> = CHANNELS
                .iter()
                .map(|ch| {
                    candidates
                        .iter()
                        .filter_map(|c| rank_of(c, *ch))
                        .max()
                        .unwrap_or(0)
                        + 1
                })
                .collect();
            for c in candidates.iter_mut() {
                let total: usize = CHANNELS
                    .iter()
                    .zip(&substitutes)
                    .map(|(ch, sub)| rank_of(c, *ch).unwrap_or(*sub))
                    .sum();
                // Sign flip keeps "higher is better" uniform with rrf
                c.fused_score = -(total as f64);
            }
        }
        FusionStrategy::Weighted => {
            let channel_weights = [weights.dense, weights.text, weights.title];
            // Min-max per channel over the candidates present in it
            let bounds: Vec<Option<(f64, f64)>> = CHANNELS
                .iter()
                .map(|ch| {
                    let scores: Vec<f64> =
                        candidates.iter().filter_map(|c| score_of(c, *ch)).collect();
                    if scores.is_empty() {
                        None
                    } else {
                        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
                        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        Some((min, max))
                    }
                })
                .collect();
            for c in candidates.iter_mut() {
                let mut total = 0.0;
                for ((ch, weight), bound) in CHANNELS.iter().zip(channel_weights).zip(&bounds) {
                    let (Some(score), Some((min, max))) = (score_of(c, *ch), bound) else {
                        continue;
                    };
                    let normalized = if max > min {
                        (score - min) / (max - min)
                    } else {
                        1.0
                    };
                    total += weight * normalized;
                }
                c.fused_score = total;
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, SourceType};

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            chunk_id: None,
            source_type: SourceType::Law,
            src_title: "주택임대차보호법".to_string(),
            article: "제3조".to_string(),
            text: "본문".to_string(),
            priority: 1,
            case_no: None,
        }
    }

    fn candidate(
        id: &str,
        first_seen: usize,
        dense: Option<usize>,
        text: Option<usize>,
        title: Option<usize>,
    ) -> Candidate {
        Candidate {
            doc: doc(id),
            dense_rank: dense,
            bm25_text_rank: text,
            bm25_title_rank: title,
            dense_score: dense.map(|r| 1.0 / r as f64),
            bm25_text_score: text.map(|r| 10.0 - r as f64),
            bm25_title_score: title.map(|r| 5.0 - r as f64),
            fused_score: 0.0,
            first_seen,
        }
    }

    fn default_weights() -> ChannelWeights {
        ChannelWeights::from_config(0.5, 0.5, 0.6, true)
    }

    #[test]
    fn rrf_absent_channel_contributes_nothing() {
        let mut cands = vec![candidate("a", 0, Some(1), Some(3), None)];
        let mut single = cands.clone();
        fuse_candidates(&mut single, FusionStrategy::Rrf, 60, default_weights());
        // len 1 short-circuits; add a filler to exercise the math
        cands.push(candidate("b", 1, Some(2), None, None));
        fuse_candidates(&mut cands, FusionStrategy::Rrf, 60, default_weights());
        let a = cands.iter().find(|c| c.doc.id == "a").unwrap();
        let expected = 1.0 / 61.0 + 1.0 / 63.0;
        assert!((a.fused_score - expected).abs() < 1e-12);
    }

    #[test]
    fn rank_sum_substitutes_worst_plus_one() {
        let mut cands = vec![
            candidate("a", 0, Some(1), Some(2), None),
            candidate("b", 1, Some(2), Some(1), None),
        ];
        fuse_candidates(&mut cands, FusionStrategy::RankSum, 60, default_weights());
        // Title channel is empty for both: substitute 0 + 1 = 1 each.
        // a: -(1 + 2 + 1) = -4, b: -(2 + 1 + 1) = -4 -> tie broken by first_seen
        assert_eq!(cands[0].doc.id, "a");
        assert_eq!(cands[0].fused_score, -4.0);
        assert_eq!(cands[1].fused_score, -4.0);
    }

    #[test]
    fn weighted_prefers_high_normalized_scores() {
        let mut cands = vec![
            candidate("a", 0, Some(1), Some(1), Some(1)),
            candidate("b", 1, Some(3), Some(3), Some(3)),
            candidate("c", 2, Some(2), Some(2), Some(2)),
        ];
        fuse_candidates(&mut cands, FusionStrategy::Weighted, 60, default_weights());
        let ids: Vec<&str> = cands.iter().map(|c| c.doc.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn fusion_is_deterministic() {
        let build = || {
            vec![
                candidate("a", 0, Some(1), Some(4), Some(2)),
                candidate("b", 1, Some(2), Some(3), None),
                candidate("c", 2, Some(3), Some(2), Some(1)),
                candidate("d", 3, None, Some(1), Some(3)),
            ]
        };
        let mut first = build();
        fuse_candidates(&mut first, FusionStrategy::Rrf, 60, default_weights());
        for _ in 0..20 {
            let mut again = build();
            fuse_candidates(&mut again, FusionStrategy::Rrf, 60, default_weights());
            let a: Vec<&str> = first.iter().map(|c| c.doc.id.as_str()).collect();
            let b: Vec<&str> = again.iter().map(|c| c.doc.id.as_str()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn ties_break_on_first_appearance() {
        // Same single-channel rank structure, mirrored: identical fused scores
        let mut cands = vec![
            candidate("late", 5, Some(1), None, None),
            candidate("early", 2, None, Some(1), None),
        ];
        fuse_candidates(&mut cands, FusionStrategy::Rrf, 60, default_weights());
        assert_eq!(cands[0].doc.id, "early");
    }

    #[test]
    fn weights_split_sparse_share() {
        let w = ChannelWeights::from_config(0.5, 0.5, 0.6, true);
        assert!((w.title - 0.3).abs() < 1e-12);
        assert!((w.text - 0.2).abs() < 1e-12);
        let w = ChannelWeights::from_config(0.5, 0.5, 0.6, false);
        assert_eq!(w.title, 0.0);
        assert!((w.text - 0.5).abs() < 1e-12);
    }
}
