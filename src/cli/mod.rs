//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "newsfuse",
    version,
    author = "neur0map",
    about = "Hybrid keyword + vector retrieval over news corpora",
    long_about = "newsfuse indexes a JSON Lines news corpus into a BM25 keyword index and an HNSW \
                  vector index, fuses both rankings with Reciprocal Rank Fusion, and optionally \
                  rewrites queries with a language model and reranks results with a cross-encoder."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/newsfuse/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "fast", "precise")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve documents for a query
    Query {
        /// Query text
        query: String,

        /// Corpus file, one JSON document per line
        #[arg(long, value_name = "FILE.jsonl")]
        corpus: PathBuf,

        /// Candidates kept after fusion
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Results returned
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Per-branch over-fetch multiplier (>= 1.0)
        #[arg(long)]
        prefetch_ratio: Option<f32>,

        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,

        /// Rewrite the query with the configured language model
        #[arg(long, conflicts_with = "no_reformulate")]
        reformulate: bool,

        /// Never rewrite the query
        #[arg(long)]
        no_reformulate: bool,

        /// Show results in JSON format
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
    Show {
        /// Show only a specific section (e.g., "retrieval")
        #[arg(short, long)]
        section: Option<String>,
    },

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

    /// Print the default configuration path
    Path,
}

impl Commands {
    /// Tri-state reformulation override from the two flags
    pub fn reformulation_override(reformulate: bool, no_reformulate: bool) -> Option<bool> {
        match (reformulate, no_reformulate) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
