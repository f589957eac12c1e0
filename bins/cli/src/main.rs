//! CLI binary entrypoint.

mod commands;
mod error;
mod wiring;

use clap::{Parser, Subcommand};
use error::render_error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "codeatlas",
    version,
    about = "Semantic code search indexing engine",
    long_about = None
)]
struct Cli {
    /// Emit results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index a codebase into the vector database.
    Index {
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Drop an existing collection and rebuild it.
        #[arg(long)]
        force: bool,
        /// Splitter variant: `ast` or `langchain`.
        #[arg(long)]
        splitter: Option<String>,
        /// Extra ignore globs, merged with the defaults.
        #[arg(long = "ignore", value_name = "GLOB")]
        ignore_patterns: Vec<String>,
    },
    /// Search an indexed codebase with a natural-language query.
    Search {
        /// Query text.
        query: String,
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Minimum similarity score in [0, 1].
        #[arg(long)]
        threshold: Option<f32>,
        /// Restrict results to these extensions (e.g. `.rs`).
        #[arg(long = "extension", value_name = "EXT")]
        extensions: Vec<String>,
    },
    /// Drop a codebase's collection and snapshot.
    Clear {
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show indexing state for a codebase.
    Stats {
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Watch a codebase and keep its index synchronized.
    Watch {
        /// Codebase root (defaults to the current directory).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Queue drain interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Index {
            path,
            force,
            splitter,
            ignore_patterns,
        } => commands::index::run(cli.json, path, force, splitter, ignore_patterns).await,
        Commands::Search {
            query,
            path,
            limit,
            threshold,
            extensions,
        } => commands::search::run(cli.json, query, path, limit, threshold, extensions).await,
        Commands::Clear { path } => commands::clear::run(cli.json, path).await,
        Commands::Stats { path } => commands::stats::run(cli.json, path).await,
        Commands::Watch { path, interval_ms } => {
            commands::watch::run(cli.json, path, interval_ms).await
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", render_error(&error));
            ExitCode::FAILURE
        },
    }
}
