//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod offline;

#[derive(Parser, Debug)]
#[command(
    name = "lexlease",
    version,
    about = "Evidence retrieval for Korean residential lease law questions",
    long_about = "Lexlease retrieves statutes, regulations, and court decisions relevant to a \
                  residential lease question, ranks them with hybrid dense/BM25 fusion and \
                  cross-encoder reranking, and assembles a hierarchically sectioned evidence \
                  block for answer generation."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lexlease/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question against a local evidence corpus
    Ask {
        /// Question text
        question: String,

        /// Path to the evidence corpus (JSON Lines, one document per line)
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Path to an OCR text file of the user's own contract
        #[arg(long, value_name = "FILE")]
        contract: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
