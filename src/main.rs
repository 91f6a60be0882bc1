//! # docqa CLI
//!
//! The `docqa` binary keeps a vector index of a documents directory up to
//! date and answers questions against it.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the vector store schema and the documents directory |
//! | `docqa status` | Compare documents with the saved index state |
//! | `docqa sync [--force]` | Reuse the index if fresh, otherwise rebuild it |
//! | `docqa search "<query>"` | Print the closest chunks |
//! | `docqa ask "<question>"` | Retrieve, assemble and optionally generate an answer |
//! | `docqa chat` | Interactive question loop (the default) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docqa::config;
use docqa::shell::SETUP_HELP;
use docqa::sqlite_store::SqliteStore;
use docqa::sync::SyncError;
use docqa::{search, shell, status, sync};
use docqa_core::store::VectorStore;

/// docqa: ask questions about a directory of text and markdown documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Local document question answering over an incrementally synced vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vector store schema and the documents directory.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Show whether the next run will reuse or rebuild the index.
    Status,

    /// Bring the index up to date with the documents directory.
    Sync {
        /// Rebuild even when the saved state says the index is fresh.
        #[arg(long)]
        force: bool,
    },

    /// Print the chunks most similar to a query.
    Search {
        /// Search query text.
        query: String,

        /// Number of results (default from `retrieval.default_k`).
        #[arg(short, value_parser = parse_positive)]
        k: Option<usize>,
    },

    /// Answer one question from the retrieved chunks.
    Ask {
        question: String,

        /// Number of chunks to retrieve.
        #[arg(short, value_parser = parse_positive)]
        k: Option<usize>,

        /// Send the assembled context to the answer service.
        #[arg(long)]
        generate: bool,
    },

    /// Interactive question loop.
    Chat,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("must be a positive number".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a valid number", s)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "docqa=debug,docqa_core=debug"
    } else {
        "docqa=info,docqa_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    let result = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Init => run_init(&cfg).await,
        Commands::Status => status::run_status(&cfg).await,
        Commands::Sync { force } => sync::run_sync(&cfg, force).await,
        Commands::Search { query, k } => search::run_search(&cfg, &query, k).await,
        Commands::Ask {
            question,
            k,
            generate,
        } => search::run_ask(&cfg, &question, k, generate).await,
        Commands::Chat => shell::run_chat(&cfg).await,
    };

    if let Err(e) = &result {
        if e.downcast_ref::<SyncError>().is_some() {
            eprintln!("Error setting up the system: {}", e);
            eprintln!();
            eprintln!("{}", SETUP_HELP);
        }
    }
    result
}

async fn run_init(cfg: &config::Config) -> anyhow::Result<()> {
    let store = SqliteStore::new(&cfg.store.url)?;
    store.ping().await?;
    store.close().await;
    println!("Vector store initialized successfully.");

    if !cfg.documents.dir.exists() {
        std::fs::create_dir_all(&cfg.documents.dir)?;
        println!("Created documents directory: {}", cfg.documents.dir.display());
    }
    Ok(())
}
