//! Pipeline configuration
//!
//! Loaded once at startup, validated, then shared read-only across requests.
//! There is no runtime mutation surface.

use crate::error::{LexError, Result};
use crate::retrieval::fusion::FusionStrategy;
use crate::sparse::{Bm25Params, SparseMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Immutable pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub retrieval: RetrievalConfig,
    pub sparse: SparseConfig,
    pub fusion: FusionConfig,
    pub rerank: RerankConfig,
    pub expansion: ExpansionConfig,
    pub format: FormatConfig,
    pub timeouts: TimeoutConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Dense retrieval fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Final top-k per collection
    pub k_law: usize,
    pub k_rule: usize,
    pub k_case: usize,
    /// Candidate over-fetch factor for dense search
    pub search_multiplier: usize,
    /// Case collection over-fetches this many chunks before fusion
    pub case_candidate_k: usize,
}

/// BM25 sparse channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseConfig {
    pub enable_bm25: bool,
    pub mode: SparseMode,
    pub bm25_k1: f64,
    pub bm25_b: f64,
    /// Body text truncation before tokenization
    pub max_doc_chars: usize,
    /// Second sparse channel over the title field
    pub enable_title: bool,
    pub title_max_chars: usize,
    /// Minimum token length kept by the tokenizer
    pub min_token_length: usize,
    /// Global-mode top-k overrides; defaults derive from k * multiplier
    pub sparse_k_law: Option<usize>,
    pub sparse_k_rule: Option<usize>,
    pub sparse_k_case: Option<usize>,
}

impl SparseConfig {
    pub fn params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.bm25_k1,
            b: self.bm25_b,
        }
    }
}

/// Rank fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,
    pub rrf_k: u32,
    /// Channel weights, used by the `weighted` strategy only
    pub dense_weight: f64,
    pub sparse_weight: f64,
    /// Share of the sparse weight given to the title channel
    pub sparse_title_ratio: f64,
}

/// Cross-encoder rerank settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub enable: bool,
    /// Hard cap on documents sent to the rerank service
    pub budget: usize,
    /// Scores below this are dropped (with a top-up fallback)
    pub threshold: f64,
    /// Per-document text truncation for the rerank payload
    pub doc_max_chars: usize,
}

/// Case full-text expansion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// How many top cases to expand; defaults to k_case when unset
    pub case_expand_top_n: Option<usize>,
}

/// Evidence rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Per-document text budget in the rendered context
    pub text_max_chars: usize,
    /// Budget for the user-contract excerpt (section 0)
    pub contract_max_chars: usize,
    /// Priority values rendered as core statutes (section 1)
    pub statute_priorities: Vec<u32>,
    /// Priority values rendered as regulations (section 2)
    pub regulation_priorities: Vec<u32>,
}

/// Timeouts for external calls, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub embed_ms: u64,
    pub dense_search_ms: u64,
    pub rerank_ms: u64,
    pub case_lookup_ms: u64,
}

impl TimeoutConfig {
    pub fn embed(&self) -> Duration {
        Duration::from_millis(self.embed_ms)
    }
    pub fn dense_search(&self) -> Duration {
        Duration::from_millis(self.dense_search_ms)
    }
    pub fn rerank(&self) -> Duration {
        Duration::from_millis(self.rerank_ms)
    }
    pub fn case_lookup(&self) -> Duration {
        Duration::from_millis(self.case_lookup_ms)
    }
}

impl PipelineConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LexError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LexError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: PipelineConfig = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LexError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LEXLEASE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LEXLEASE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RERANK__ENABLE" => {
                self.rerank.enable = value.parse().map_err(|_| {
                    LexError::Config(format!("Cannot parse '{}' as boolean", value))
                })?;
            }
            "RERANK__BUDGET" => {
                self.rerank.budget = value.parse().map_err(|_| {
                    LexError::Config(format!("Cannot parse '{}' as integer", value))
                })?;
            }
            "SPARSE__ENABLE_BM25" => {
                self.sparse.enable_bm25 = value.parse().map_err(|_| {
                    LexError::Config(format!("Cannot parse '{}' as boolean", value))
                })?;
            }
            "SPARSE__MODE" => {
                self.sparse.mode = match value {
                    "auto" => SparseMode::Auto,
                    "candidate" => SparseMode::Candidate,
                    "global" => SparseMode::Global,
                    other => {
                        return Err(LexError::Config(format!("Unknown sparse mode: {other}")))
                    }
                };
            }
            "FUSION__STRATEGY" => {
                self.fusion.strategy = match value {
                    "rrf" => FusionStrategy::Rrf,
                    "rank_sum" => FusionStrategy::RankSum,
                    "weighted" => FusionStrategy::Weighted,
                    other => {
                        return Err(LexError::Config(format!("Unknown fusion strategy: {other}")))
                    }
                };
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LexError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lexlease").join("config.toml"))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            retrieval: RetrievalConfig {
                k_law: 7,
                k_rule: 7,
                k_case: 3,
                search_multiplier: 4,
                case_candidate_k: 40,
            },
            sparse: SparseConfig {
                enable_bm25: true,
                mode: SparseMode::Auto,
                bm25_k1: 1.8,
                bm25_b: 0.85,
                max_doc_chars: 4000,
                enable_title: true,
                title_max_chars: 512,
                min_token_length: 1,
                sparse_k_law: None,
                sparse_k_rule: None,
                sparse_k_case: None,
            },
            fusion: FusionConfig {
                strategy: FusionStrategy::Rrf,
                rrf_k: 60,
                dense_weight: 0.5,
                sparse_weight: 0.5,
                sparse_title_ratio: 0.6,
            },
            rerank: RerankConfig {
                enable: true,
                budget: 80,
                threshold: 0.2,
                doc_max_chars: 2600,
            },
            expansion: ExpansionConfig {
                case_expand_top_n: None,
            },
            format: FormatConfig {
                text_max_chars: 2500,
                contract_max_chars: 12000,
                statute_priorities: vec![1, 2, 4, 5],
                regulation_priorities: vec![3, 6, 7, 8, 11],
            },
            timeouts: TimeoutConfig {
                embed_ms: 10_000,
                dense_search_ms: 10_000,
                rerank_ms: 15_000,
                case_lookup_ms: 10_000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn roundtrip_through_toml() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = PipelineConfig::default();
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.retrieval.k_law, 7);
        assert_eq!(loaded.fusion.rrf_k, 60);
        assert_eq!(loaded.format.statute_priorities, vec![1, 2, 4, 5]);
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let err = PipelineConfig::load(Path::new("/nonexistent/lexlease.toml")).unwrap_err();
        assert!(matches!(err, LexError::ConfigNotFound { .. }));
    }
}
