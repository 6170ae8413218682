use newsfuse::cli::{Cli, Commands, ConfigAction};
use newsfuse::config::{Config, ConfigValidator};
use newsfuse::error::{NewsfuseError, Result};
use newsfuse::pipeline::{self, BuildOptions};
use newsfuse::retrieval::{RetrievalRequest, RetrievalResponse};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            query,
            corpus,
            top_k,
            top_n,
            prefetch_ratio,
            no_rerank,
            reformulate,
            no_reformulate,
            json,
        } => {
            let request = RetrievalRequest {
                query,
                top_k,
                top_n,
                prefetch_ratio,
                use_rerank: no_rerank.then_some(false),
                enable_query_reformulation: Commands::reformulation_override(
                    reformulate,
                    no_reformulate,
                ),
                history: Vec::new(),
            };
            cmd_query(cli.config, cli.profile, &corpus, request, json).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("newsfuse=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsfuse=info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_query(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    corpus: &std::path::Path,
    request: RetrievalRequest,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    let options = BuildOptions {
        reranker: request.use_rerank.unwrap_or(config.retrieval.use_rerank),
        rewriter: request
            .enable_query_reformulation
            .unwrap_or(config.retrieval.enable_query_reformulation),
    };

    let retriever = pipeline::build(&config, corpus, options).await?;
    let response = retriever.retrieve(&request).await?;

    if json {
        let output = serde_json::to_string_pretty(&response).map_err(|e| NewsfuseError::Json {
            source: e,
            context: "Failed to serialize response".to_string(),
        })?;
        println!("{}", output);
    } else {
        print_response(&response);
    }

    Ok(())
}

fn print_response(response: &RetrievalResponse) {
    let meta = &response.metadata;

    println!("Query: {}", meta.query_text);
    if meta.reformulation_applied {
        println!("  (rewritten by language model)");
    }
    println!();

    if response.results.is_empty() {
        println!("No results");
    }

    for result in &response.results {
        let doc = &result.document;
        println!(
            "{:>2}. [{:.4} {:?}] {}  #{}  {}",
            result.final_rank,
            result.final_score,
            result.score_source,
            doc.id,
            doc.channel_id,
            doc.timestamp.format("%Y-%m-%d %H:%M")
        );
        println!("    {}", doc.preview(200));
        if let Some(url) = &doc.url {
            println!("    {}", url);
        }
    }

    println!();
    println!(
        "{} results in {}ms (sparse: {}, dense: {})",
        response.results.len(),
        meta.elapsed_ms,
        meta.sparse_candidates,
        meta.dense_candidates
    );

    let mut degraded = Vec::new();
    if meta.sparse_branch_failed {
        degraded.push("keyword search failed");
    }
    if meta.dense_branch_failed {
        degraded.push("vector search failed");
    }
    if meta.reformulation_failed {
        degraded.push("query rewrite failed");
    }
    if meta.rerank_failed {
        degraded.push("reranking failed");
    }
    if !degraded.is_empty() {
        println!("⚠ Degraded: {}", degraded.join(", "));
    }
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| NewsfuseError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let value = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    NewsfuseError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&value).map_err(|e| NewsfuseError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let mut config = Config::load(&path)?;
            if let Some(profile) = profile {
                config.apply_profile(&profile)?;
            }
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Profiles: {}", config.profiles.len());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| NewsfuseError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = if path.exists() {
        Config::load(&path)?
    } else {
        tracing::warn!(
            "Config file not found, using defaults. Run 'newsfuse config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        config
    };

    if let Some(profile) = profile {
        config.apply_profile(&profile)?;
    }

    Ok(config)
}
