use lexlease::cli::offline::{
    load_corpus, FixtureCaseStore, FixtureIndex, HashingEmbedder, LexicalRerank,
};
use lexlease::cli::{Cli, Commands, ConfigAction};
use lexlease::config::PipelineConfig;
use lexlease::document::Collection;
use lexlease::error::{LexError, Result};
use lexlease::pipeline::Pipeline;
use lexlease::sparse::{InvertedIndex, SparseIndexSet, SparseMode};
use lexlease::tokenize::select_tokenizer;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ask {
            question,
            corpus,
            contract,
            json,
        } => {
            cmd_ask(cli.config, &question, &corpus, contract, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "lexlease=debug"
    } else {
        "lexlease=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    corpus_path: &std::path::Path,
    contract_path: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;

    // Whitespace normalization; the corpus side is normalized at build time
    let question = question.split_whitespace().collect::<Vec<_>>().join(" ");
    if question.is_empty() {
        return Err(LexError::Config("question is empty".to_string()));
    }

    let contract_excerpt = match contract_path {
        Some(path) => Some(std::fs::read_to_string(&path).map_err(|e| LexError::Io {
            source: e,
            context: format!("Failed to read contract file: {:?}", path),
        })?),
        None => None,
    };

    let corpus = load_corpus(corpus_path)?;
    let tokenizer = select_tokenizer(None, config.sparse.min_token_length);

    // Fixture backends derived from the corpus file
    let embedder = Arc::new(HashingEmbedder::new(tokenizer.clone()));
    let index = Arc::new(FixtureIndex::build(&corpus, tokenizer.as_ref()));
    let rerank = Arc::new(LexicalRerank::new(tokenizer.clone()));
    let case_store = Arc::new(FixtureCaseStore::build(&corpus));

    let sparse_index = if config.sparse.enable_bm25 && config.sparse.mode != SparseMode::Candidate
    {
        let mut set = SparseIndexSet::new();
        for collection in Collection::ALL {
            let docs: Vec<_> = corpus
                .iter()
                .filter(|h| h.source_type == collection.source_type())
                .filter_map(|h| h.clone().into_document().ok())
                .collect();
            set.insert(
                collection,
                InvertedIndex::build(
                    docs,
                    tokenizer.as_ref(),
                    config.sparse.params(),
                    config.sparse.max_doc_chars,
                ),
            );
        }
        Some(Arc::new(set))
    } else {
        None
    };

    let pipeline = Pipeline::new(
        Arc::new(config),
        embedder,
        index,
        rerank,
        case_store,
        tokenizer,
        sparse_index,
    )?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| LexError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let output = rt.block_on(pipeline.retrieve(&question, contract_excerpt.as_deref()))?;

    if json {
        let value = serde_json::json!({
            "query": output.normalized_query,
            "references": output.references,
            "answer_context": output.answer_context,
            "degraded": {
                "rerank_unavailable": output.degraded.rerank_unavailable,
                "dense_unavailable": output.degraded.dense_unavailable,
                "malformed_skipped": output.degraded.malformed_skipped,
                "case_lookups_failed": output.degraded.case_lookups_failed,
            },
        });
        let rendered = serde_json::to_string_pretty(&value).map_err(|e| LexError::Json {
            source: e,
            context: "Failed to serialize result".to_string(),
        })?;
        println!("{rendered}");
    } else {
        println!("{}", output.answer_context);
        println!("\n참고 자료:");
        for reference in &output.references {
            println!("  - {reference}");
        }
        if output.degraded.any() {
            println!("\n⚠ Some retrieval backends degraded during this request");
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let rendered = serde_json::to_string_pretty(&config).map_err(|e| LexError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{rendered}");
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => PipelineConfig::default_path()?,
            };
            let config = PipelineConfig::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = PipelineConfig::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LexError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = PipelineConfig::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<PipelineConfig> {
    let path = match config_path {
        Some(path) => path,
        None => PipelineConfig::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lexlease config init' to create one."
        );
        return Ok(PipelineConfig::default());
    }

    PipelineConfig::load(&path)
}
