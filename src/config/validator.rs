use crate::config::PipelineConfig;
use crate::error::{LexError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &PipelineConfig) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_sparse(config, &mut errors);
        Self::validate_fusion(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_format(config, &mut errors);
        Self::validate_timeouts(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LexError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_retrieval(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;
        if r.k_law == 0 || r.k_rule == 0 || r.k_case == 0 {
            errors.push(ValidationError::new(
                "retrieval.k_*",
                "Per-collection top-k values must be greater than 0",
            ));
        }
        if r.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "Search multiplier must be at least 1",
            ));
        }
        if r.case_candidate_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.case_candidate_k",
                "Case candidate count must be at least 1",
            ));
        }
    }

    fn validate_sparse(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let s = &config.sparse;
        if !s.enable_bm25 {
            return;
        }
        if s.bm25_k1 <= 0.0 {
            errors.push(ValidationError::new(
                "sparse.bm25_k1",
                "k1 must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&s.bm25_b) {
            errors.push(ValidationError::new(
                "sparse.bm25_b",
                "b must be between 0 and 1",
            ));
        }
        if s.enable_title && s.title_max_chars < 32 {
            errors.push(ValidationError::new(
                "sparse.title_max_chars",
                "Title truncation below 32 characters loses the title itself",
            ));
        }
        if s.min_token_length == 0 {
            errors.push(ValidationError::new(
                "sparse.min_token_length",
                "Minimum token length must be at least 1",
            ));
        }
    }

    fn validate_fusion(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let f = &config.fusion;
        if f.rrf_k == 0 {
            errors.push(ValidationError::new("fusion.rrf_k", "rrf_k must be at least 1"));
        }
        if f.dense_weight < 0.0 || f.sparse_weight < 0.0 {
            errors.push(ValidationError::new(
                "fusion.*_weight",
                "Channel weights must be non-negative",
            ));
        }
        if f.dense_weight == 0.0 && f.sparse_weight == 0.0 {
            errors.push(ValidationError::new(
                "fusion.*_weight",
                "Dense and sparse weights cannot both be zero",
            ));
        }
        if !(0.0..=1.0).contains(&f.sparse_title_ratio) {
            errors.push(ValidationError::new(
                "fusion.sparse_title_ratio",
                "Title ratio must be between 0 and 1",
            ));
        }
    }

    fn validate_rerank(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let r = &config.rerank;
        if r.enable && r.budget == 0 {
            errors.push(ValidationError::new(
                "rerank.budget",
                "Rerank budget must be at least 1 when reranking is enabled",
            ));
        }
        if r.enable && r.doc_max_chars == 0 {
            errors.push(ValidationError::new(
                "rerank.doc_max_chars",
                "Rerank document truncation must be greater than 0",
            ));
        }
    }

    fn validate_format(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let f = &config.format;
        if f.text_max_chars == 0 {
            errors.push(ValidationError::new(
                "format.text_max_chars",
                "Text budget must be greater than 0",
            ));
        }
        // Section assignment must be a function: the tiers cannot overlap
        let overlap: Vec<u32> = f
            .statute_priorities
            .iter()
            .filter(|p| f.regulation_priorities.contains(p))
            .copied()
            .collect();
        if !overlap.is_empty() {
            errors.push(ValidationError::new(
                "format.statute_priorities",
                format!("Priorities mapped to both sections: {:?}", overlap),
            ));
        }
    }

    fn validate_timeouts(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
        let t = &config.timeouts;
        for (path, value) in [
            ("timeouts.embed_ms", t.embed_ms),
            ("timeouts.dense_search_ms", t.dense_search_ms),
            ("timeouts.rerank_ms", t.rerank_ms),
            ("timeouts.case_lookup_ms", t.case_lookup_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Timeout must be greater than 0"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_bm25_b() {
        let mut config = PipelineConfig::default();
        config.sparse.bm25_b = 1.5;
        let err = ConfigValidator::validate(&config).unwrap_err();
        match err {
            LexError::ConfigValidation { errors } => {
                assert!(errors.iter().any(|e| e.path == "sparse.bm25_b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_overlapping_priority_tiers() {
        let mut config = PipelineConfig::default();
        config.format.statute_priorities = vec![1, 3];
        let err = ConfigValidator::validate(&config).unwrap_err();
        match err {
            LexError::ConfigValidation { errors } => {
                assert!(errors.iter().any(|e| e.path == "format.statute_priorities"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disabled_bm25_skips_sparse_checks() {
        let mut config = PipelineConfig::default();
        config.sparse.enable_bm25 = false;
        config.sparse.bm25_k1 = -1.0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn rejects_zero_weights() {
        let mut config = PipelineConfig::default();
        config.fusion.dense_weight = 0.0;
        config.fusion.sparse_weight = 0.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
