//! # neon-search
//!
//! Hybrid search over a Neon Postgres database from the command line.
//!
//! Usage:
//!   neon-search migrate                                   # create tables and indexes
//!   neon-search search "branch reset" --limit 5           # hybrid search
//!   neon-search semantic "branch reset" --embedding-file q.json
//!   neon-search keyword "\"connection pooling\" -pgbouncer"
//!
//! Environment:
//!   DATABASE_URL            - required connection string
//!   OPENAI_API_KEY          - needed when no --embedding-file is given
//!   NEON_SEARCH_DIMENSIONS  - embedding dimension (default 1536)
//!   RUST_LOG                - log filter (default info)

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neon-search", version, about = "Hybrid semantic + keyword search for Neon Postgres")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Embedding dimension of the corpus
    #[arg(long, env = "NEON_SEARCH_DIMENSIONS", default_value_t = neon_search::config::DEFAULT_DIMENSIONS)]
    dimensions: usize,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create the vector extension, tables and indexes
    Migrate,

    /// Semantic + keyword search fused with weighted RRF
    Search {
        /// Search phrase
        query: String,

        /// JSON array holding a precomputed query embedding
        #[arg(long)]
        embedding_file: Option<PathBuf>,

        /// Number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Weight of the semantic ranking (with --keyword-weight, must sum to 1)
        #[arg(long, requires = "keyword_weight")]
        semantic_weight: Option<f64>,

        /// Weight of the keyword ranking
        #[arg(long, requires = "semantic_weight")]
        keyword_weight: Option<f64>,
    },

    /// Vector similarity only
    Semantic {
        query: String,

        #[arg(long)]
        embedding_file: Option<PathBuf>,

        #[arg(short, long, default_value_t = neon_search::config::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Full-text match only
    Keyword {
        query: String,

        #[arg(short, long, default_value_t = neon_search::config::DEFAULT_LIMIT)]
        limit: usize,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let ctx = commands::Context::connect(&cli.database_url, cli.dimensions).await?;

    match cli.command {
        Command::Migrate => ctx.migrate().await,
        Command::Search { query, embedding_file, limit, semantic_weight, keyword_weight } => {
            let weights = semantic_weight.zip(keyword_weight);
            ctx.search(&query, embedding_file.as_deref(), limit, weights).await
        }
        Command::Semantic { query, embedding_file, limit } => {
            ctx.semantic(&query, embedding_file.as_deref(), limit).await
        }
        Command::Keyword { query, limit } => ctx.keyword(&query, limit).await,
    }
}
