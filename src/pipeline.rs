//! Request orchestration
//!
//! One `Pipeline` instance serves all requests. Per-request state stays on
//! the stack of `retrieve`; the shared pieces (config, indexes, service
//! handles) are read-only after startup.

use crate::config::PipelineConfig;
use crate::document::{Candidate, Collection, Document, SourceType};
use crate::error::{LexError, Result};
use crate::format::{truncate_chars, HierarchyFormatter, SectionMap};
use crate::retrieval::{
    admit_for_rerank, dedup_candidates, dedup_documents, fuse_candidates, CaseExpander,
    ChannelWeights, DenseSearchAdapter, Reranker,
};
use crate::services::{CaseFullText, QueryEmbedder, RerankService, VectorSearch};
use crate::sparse::{ranks_from_scores, score_candidates, SparseIndexSet, SparseMode};
use crate::tokenize::Tokenizer;
use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Degradations accumulated while serving one request
///
/// Never fatal on their own; the caller decides whether to surface them.
#[derive(Debug, Default, Clone)]
pub struct DegradedFlags {
    /// Rerank service failed; results are in fused order
    pub rerank_unavailable: bool,
    /// Collections whose dense search failed or timed out
    pub dense_unavailable: Vec<Collection>,
    /// Dense hits skipped for missing required fields
    pub malformed_skipped: usize,
    /// Case full-text lookups that failed (excerpt kept)
    pub case_lookups_failed: usize,
}

impl DegradedFlags {
    pub fn any(&self) -> bool {
        self.rerank_unavailable
            || !self.dense_unavailable.is_empty()
            || self.malformed_skipped > 0
            || self.case_lookups_failed > 0
    }
}

/// Everything the answer-generation collaborator needs
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub normalized_query: String,
    /// UI-facing citation list, deduplicated, best evidence first
    pub references: Vec<String>,
    /// Hierarchically sectioned evidence block
    pub answer_context: String,
    /// The selected documents in final order
    pub docs: Vec<Document>,
    pub degraded: DegradedFlags,
}

/// The retrieval pipeline: dense fan-out, sparse scoring, fusion, rerank,
/// dedup, case expansion, hierarchical assembly.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    dense: DenseSearchAdapter,
    reranker: Reranker,
    expander: CaseExpander,
    tokenizer: Arc<dyn Tokenizer>,
    sparse_index: Option<Arc<SparseIndexSet>>,
    formatter: HierarchyFormatter,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        embedder: Arc<dyn QueryEmbedder>,
        vector: Arc<dyn VectorSearch>,
        rerank_service: Arc<dyn RerankService>,
        case_store: Arc<dyn CaseFullText>,
        tokenizer: Arc<dyn Tokenizer>,
        sparse_index: Option<Arc<SparseIndexSet>>,
    ) -> Result<Self> {
        // Global mode promises a prebuilt index; a missing set is a
        // configuration error, not a per-request degradation
        if config.sparse.enable_bm25
            && config.sparse.mode == SparseMode::Global
            && sparse_index.is_none()
        {
            return Err(LexError::Config(
                "sparse.mode = \"global\" requires a prebuilt BM25 index set".to_string(),
            ));
        }

        let dense = DenseSearchAdapter::new(
            embedder,
            vector,
            config.timeouts.embed(),
            config.timeouts.dense_search(),
        );
        let fallback_top =
            config.retrieval.k_law + config.retrieval.k_rule + config.retrieval.k_case;
        let reranker = Reranker::new(
            rerank_service,
            config.timeouts.rerank(),
            config.rerank.doc_max_chars,
            config.rerank.threshold,
            fallback_top,
        );
        let expander = CaseExpander::new(
            case_store,
            config.timeouts.case_lookup(),
            config.format.text_max_chars,
        );
        let formatter = HierarchyFormatter::new(
            SectionMap::new(
                &config.format.statute_priorities,
                &config.format.regulation_priorities,
            ),
            config.format.text_max_chars,
            config.format.contract_max_chars,
        );
        Ok(Self {
            config,
            dense,
            reranker,
            expander,
            tokenizer,
            sparse_index,
            formatter,
        })
    }

    /// Retrieve, rank, and assemble evidence for one normalized query
    ///
    /// `contract_excerpt` is the OCR text of the user's own contract, rendered
    /// ahead of all retrieved evidence when present.
    pub async fn retrieve(
        &self,
        normalized_query: &str,
        contract_excerpt: Option<&str>,
    ) -> Result<PipelineOutput> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("retrieve", %request_id);
        self.retrieve_inner(normalized_query, contract_excerpt)
            .instrument(span)
            .await
    }

    async fn retrieve_inner(
        &self,
        normalized_query: &str,
        contract_excerpt: Option<&str>,
    ) -> Result<PipelineOutput> {
        let cfg = &self.config;
        let mut degraded = DegradedFlags::default();

        let query_terms = self.tokenizer.tokenize(normalized_query);
        tracing::debug!(terms = query_terms.len(), "query tokenized");

        // Global BM25 searches need only the query terms, so they run on the
        // blocking pool while the dense calls are in flight
        let law_sparse = self.spawn_global_search(Collection::Law, &query_terms);
        let rule_sparse = self.spawn_global_search(Collection::Rule, &query_terms);
        let case_sparse = self.spawn_global_search(Collection::Case, &query_terms);

        // One embedding per request; a failure degrades every dense channel
        let embedding = match self.dense.embed_query(normalized_query).await {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!("query embedding failed, dense channels disabled: {e}");
                None
            }
        };

        let (law_dense, rule_dense, case_dense) = match &embedding {
            Some(emb) => {
                let law_k = cfg.retrieval.k_law * cfg.retrieval.search_multiplier;
                let rule_k = cfg.retrieval.k_rule * cfg.retrieval.search_multiplier;
                let case_k = cfg.retrieval.case_candidate_k;
                tokio::join!(
                    self.dense.search(emb, Collection::Law, law_k),
                    self.dense.search(emb, Collection::Rule, rule_k),
                    self.dense.search(emb, Collection::Case, case_k),
                )
            }
            None => {
                let down = || {
                    Err(crate::services::ServiceError::Unavailable(
                        "no query embedding".to_string(),
                    ))
                };
                (down(), down(), down())
            }
        };

        let mut failed = 0;
        let mut take = |collection: Collection,
                        outcome: std::result::Result<
            crate::retrieval::DenseOutcome,
            crate::services::ServiceError,
        >| {
            match outcome {
                Ok(o) => {
                    degraded.malformed_skipped += o.malformed;
                    o.candidates
                }
                Err(e) => {
                    tracing::warn!(collection = %collection, "dense search failed: {e}");
                    degraded.dense_unavailable.push(collection);
                    failed += 1;
                    Vec::new()
                }
            }
        };
        let law_dense = take(Collection::Law, law_dense);
        let rule_dense = take(Collection::Rule, rule_dense);
        let case_dense = take(Collection::Case, case_dense);

        if failed == Collection::ALL.len() {
            return Err(LexError::AllRetrievalFailed(
                "dense search failed for every collection".to_string(),
            ));
        }

        let law_hits = Self::join_global_search(law_sparse).await;
        let rule_hits = Self::join_global_search(rule_sparse).await;
        let case_hits = Self::join_global_search(case_sparse).await;

        let law = self.build_candidates(Collection::Law, law_dense, &query_terms, law_hits);
        let rule = self.build_candidates(Collection::Rule, rule_dense, &query_terms, rule_hits);
        let case = self.build_candidates(Collection::Case, case_dense, &query_terms, case_hits);

        // Rerank under the priority-tier budget; a service failure falls back
        // to the fused ordering
        let admitted = admit_for_rerank(law, rule, case, cfg.rerank.budget);
        let ranked_docs: Vec<Document> = if cfg.rerank.enable {
            match self.reranker.rerank(normalized_query, admitted.clone()).await {
                Ok(reranked) => reranked.into_iter().map(|r| r.candidate.doc).collect(),
                Err(e) => {
                    tracing::warn!("rerank failed, keeping fused order: {e}");
                    degraded.rerank_unavailable = true;
                    admitted.into_iter().map(|(c, _)| c.doc).collect()
                }
            }
        } else {
            admitted.into_iter().map(|(c, _)| c.doc).collect()
        };

        let ranked_docs = dedup_documents(ranked_docs);
        let expand_top_n = cfg
            .expansion
            .case_expand_top_n
            .unwrap_or(cfg.retrieval.k_case);
        let (law_docs, rule_docs, mut case_docs) = split_by_source(
            ranked_docs,
            cfg.retrieval.k_law,
            cfg.retrieval.k_rule,
            cfg.retrieval.k_case.max(expand_top_n),
        );

        degraded.case_lookups_failed = self.expander.expand(&mut case_docs, expand_top_n).await;
        case_docs.truncate(cfg.retrieval.k_case);

        let mut docs: Vec<Document> = law_docs
            .into_iter()
            .chain(rule_docs)
            .chain(case_docs)
            .collect();
        // Stable: equal priorities keep their relevance order
        docs.sort_by_key(|d| d.priority);

        if docs.is_empty() {
            return Err(LexError::NoEvidence);
        }

        let answer_context = self.formatter.format_context(&docs, contract_excerpt);
        let references = HierarchyFormatter::references(&docs);
        tracing::info!(
            docs = docs.len(),
            references = references.len(),
            degraded = degraded.any(),
            "retrieval complete"
        );

        Ok(PipelineOutput {
            normalized_query: normalized_query.to_string(),
            references,
            answer_context,
            docs,
            degraded,
        })
    }

    /// Spawn the global-mode BM25 search for one collection, if it applies
    ///
    /// Returns `None` when the sparse channel is disabled, the mode resolves
    /// to candidate scoring, or no index was built for this collection.
    fn spawn_global_search(
        &self,
        collection: Collection,
        query_terms: &[String],
    ) -> Option<JoinHandle<Vec<(Document, f64)>>> {
        if !self.config.sparse.enable_bm25 {
            return None;
        }
        let set = Arc::clone(self.sparse_index.as_ref()?);
        set.get(collection)?;
        if !self.config.sparse.mode.use_global(true) {
            return None;
        }
        let terms = query_terms.to_vec();
        let top_k = self.sparse_top_k(collection);
        Some(tokio::task::spawn_blocking(move || {
            set.get(collection)
                .map(|index| index.search(&terms, top_k))
                .unwrap_or_default()
        }))
    }

    /// `None` falls back to candidate scoring in `build_candidates`
    async fn join_global_search(
        handle: Option<JoinHandle<Vec<(Document, f64)>>>,
    ) -> Option<Vec<(Document, f64)>> {
        match handle?.await {
            Ok(hits) => Some(hits),
            Err(e) => {
                tracing::warn!("global BM25 search task failed, scoring candidates only: {e}");
                None
            }
        }
    }

    /// Merge the dense candidates with the sparse channels for one collection
    fn build_candidates(
        &self,
        collection: Collection,
        dense: Vec<Candidate>,
        query_terms: &[String],
        global_hits: Option<Vec<(Document, f64)>>,
    ) -> Vec<Candidate> {
        let cfg = &self.config;
        let mut candidates = dedup_candidates(dense);

        if cfg.sparse.enable_bm25 {
            match global_hits {
                Some(hits) => {
                    let mut by_key: AHashMap<String, usize> = candidates
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.doc.dedup_key(), i))
                        .collect();
                    for (i, (doc, score)) in hits.into_iter().enumerate() {
                        let rank = i + 1;
                        match by_key.get(&doc.dedup_key()) {
                            Some(&idx) => {
                                candidates[idx].bm25_text_rank = Some(rank);
                                candidates[idx].bm25_text_score = Some(score);
                            }
                            None => {
                                let mut c = Candidate::from_sparse(doc, candidates.len());
                                c.bm25_text_rank = Some(rank);
                                c.bm25_text_score = Some(score);
                                by_key.insert(c.doc.dedup_key(), candidates.len());
                                candidates.push(c);
                            }
                        }
                    }
                }
                None => {
                    if cfg.sparse.mode == SparseMode::Global {
                        tracing::warn!(
                            collection = %collection,
                            "no global BM25 index for collection, scoring dense candidates only"
                        );
                    }
                    if !candidates.is_empty() {
                        let docs_terms: Vec<Vec<String>> = candidates
                            .iter()
                            .map(|c| {
                                self.tokenizer.tokenize(&truncate_chars(
                                    &c.doc.text,
                                    cfg.sparse.max_doc_chars,
                                ))
                            })
                            .collect();
                        let scores =
                            score_candidates(query_terms, &docs_terms, &cfg.sparse.params());
                        let ranks = {
                            let ids: Vec<&str> =
                                candidates.iter().map(|c| c.doc.id.as_str()).collect();
                            ranks_from_scores(&scores, &ids)
                        };
                        for ((c, rank), score) in candidates.iter_mut().zip(ranks).zip(scores) {
                            if rank.is_some() {
                                c.bm25_text_rank = rank;
                                c.bm25_text_score = Some(score);
                            }
                        }
                    }
                }
            }

            // The title channel always scores over the merged candidate set
            if cfg.sparse.enable_title && !candidates.is_empty() {
                let title_terms: Vec<Vec<String>> = candidates
                    .iter()
                    .map(|c| {
                        self.tokenizer.tokenize(&truncate_chars(
                            &c.doc.src_title,
                            cfg.sparse.title_max_chars,
                        ))
                    })
                    .collect();
                let scores = score_candidates(query_terms, &title_terms, &cfg.sparse.params());
                let ranks = {
                    let ids: Vec<&str> =
                        candidates.iter().map(|c| c.doc.id.as_str()).collect();
                    ranks_from_scores(&scores, &ids)
                };
                for ((c, rank), score) in candidates.iter_mut().zip(ranks).zip(scores) {
                    if rank.is_some() {
                        c.bm25_title_rank = rank;
                        c.bm25_title_score = Some(score);
                    }
                }
            }
        }

        let weights = ChannelWeights::from_config(
            cfg.fusion.dense_weight,
            cfg.fusion.sparse_weight,
            cfg.fusion.sparse_title_ratio,
            cfg.sparse.enable_title,
        );
        fuse_candidates(
            &mut candidates,
            cfg.fusion.strategy,
            cfg.fusion.rrf_k,
            weights,
        );
        tracing::debug!(
            collection = %collection,
            candidates = candidates.len(),
            "candidates fused"
        );
        candidates
    }

    /// Global-mode sparse top-k for a collection
    fn sparse_top_k(&self, collection: Collection) -> usize {
        let r = &self.config.retrieval;
        let s = &self.config.sparse;
        match collection {
            Collection::Law => s.sparse_k_law.unwrap_or(r.k_law * r.search_multiplier),
            Collection::Rule => s.sparse_k_rule.unwrap_or(r.k_rule * r.search_multiplier),
            Collection::Case => s
                .sparse_k_case
                .unwrap_or_else(|| r.case_candidate_k.max(r.k_case * r.search_multiplier)),
        }
    }
}

/// Final per-collection selection in ranked order
///
/// Case documents additionally dedup on case number so one long opinion's
/// chunks cannot crowd out other decisions.
fn split_by_source(
    docs: Vec<Document>,
    k_law: usize,
    k_rule: usize,
    k_case: usize,
) -> (Vec<Document>, Vec<Document>, Vec<Document>) {
    let mut law = Vec::new();
    let mut rule = Vec::new();
    let mut case = Vec::new();
    let mut seen_cases: AHashSet<String> = AHashSet::new();

    for doc in docs {
        match doc.source_type {
            SourceType::Law | SourceType::UserContract => {
                if law.len() < k_law {
                    law.push(doc);
                }
            }
            SourceType::Rule => {
                if rule.len() < k_rule {
                    rule.push(doc);
                }
            }
            SourceType::Case => {
                if case.len() >= k_case {
                    continue;
                }
                if let Some(case_no) = &doc.case_no {
                    if !seen_cases.insert(case_no.clone()) {
                        continue;
                    }
                }
                case.push(doc);
            }
        }
    }
    (law, rule, case)
}
