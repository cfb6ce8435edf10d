//! # slab-search CLI
//!
//! ```bash
//! slab-search --config ./config/slab-search.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create the SQLite database and schema |
//! | `sync` | Mirror new and changed Slab documents |
//! | `search "<query>"` | Keyword, semantic, or hybrid search |
//! | `get <key>` | Print one stored document |
//! | `embed` | Backfill embeddings for stored documents |
//! | `reindex` | Rebuild the keyword index from the store |
//! | `stats` | Show counts and embedding coverage |
//! | `serve` | Start the JSON HTTP API |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use slab_search::progress::ProgressMode;
use slab_search::search::SearchParams;
use slab_search::{
    config, embed_cmd, fts_index, get, ingest, logging, migrate, search, server, stats,
};
use slab_search_core::models::EmbeddingSlot;
use slab_search_core::search::SearchMode;

#[derive(Parser)]
#[command(
    name = "slab-search",
    about = "A local searchable mirror of Slab documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/slab-search.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Mirror the Slab workspace into the local database.
    ///
    /// Only documents whose `updatedAt` changed since the last sync are
    /// fetched. Archived documents are removed from search. Ctrl-C stops
    /// after in-flight documents finish.
    Sync {
        /// Process at most this many active documents.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Search mirrored documents.
    Search {
        query: String,

        /// keyword, semantic, or hybrid.
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,

        /// Keyword share of the hybrid score, in [0, 1].
        #[arg(long)]
        weight: Option<f64>,

        #[arg(long)]
        limit: Option<usize>,

        /// Compare against the alternate embedding slot.
        #[arg(long)]
        alternate: bool,
    },

    /// Print a stored document by key.
    Get { key: String },

    /// Generate embeddings for stored documents.
    Embed {
        /// Resume at this document key.
        #[arg(long)]
        start_from: Option<String>,

        /// Skip documents that already have an embedding in the slot.
        #[arg(long)]
        missing_only: bool,
    },

    /// Rebuild the keyword index from stored documents.
    Reindex,

    /// Show document counts and embedding coverage.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { limit, progress } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_sync(&cfg, limit, mode).await?;
        }
        Commands::Search {
            query,
            mode,
            weight,
            limit,
            alternate,
        } => {
            let params = SearchParams {
                mode,
                lexical_weight: weight,
                limit,
                slot: alternate.then_some(EmbeddingSlot::Alternate),
            };
            search::run_search(&cfg, &query, params).await?;
        }
        Commands::Get { key } => {
            get::run_get(&cfg, &key).await?;
        }
        Commands::Embed {
            start_from,
            missing_only,
        } => {
            embed_cmd::run_embed(&cfg, start_from, missing_only).await?;
        }
        Commands::Reindex => {
            fts_index::run_reindex(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
