//! `sync` command wiring.
//!
//! Builds the Slab client, SQLite store, FTS5 index, and optional embedder
//! from config, runs one [`SyncEngine`] pass, and prints the summary on
//! stdout. Ctrl-C cancels the run gracefully: in-flight documents finish
//! and the partial summary is still printed.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use slab_search_core::sync::{SyncEngine, SyncRun};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::fts_index::FtsIndex;
use crate::progress::ProgressMode;
use crate::slab::SlabClient;
use crate::sqlite_store::SqliteStore;

pub async fn run_sync(config: &Config, limit: Option<usize>, progress: ProgressMode) -> Result<()> {
    let source = Arc::new(SlabClient::from_config(&config.slab)?);
    let pool = db::connect(config).await?;

    let mut options = config.sync_options();
    if limit.is_some() {
        options.max_documents = limit;
    }

    let mut engine = SyncEngine::new(
        source,
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(FtsIndex::new(pool.clone())),
        options,
    );
    if let Some(embedder) = create_embedder(&config.embedding)? {
        engine = engine.with_embedder(embedder);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight documents");
            on_interrupt.cancel();
        }
    });

    let result = engine.run(progress.reporter(), &cancel).await;
    signal_task.abort();

    let run = result?;
    print_summary(&run);

    pool.close().await;
    Ok(())
}

/// Print a [`SyncRun`] in the line-per-counter format scripts parse.
pub fn print_summary(run: &SyncRun) {
    println!("sync slab");
    println!("  total: {}", run.total);
    println!("  new: {}", run.new);
    println!("  updated: {}", run.updated);
    println!("  skipped: {}", run.skipped);
    println!("  archived removed: {}", run.archived_removed);
    if run.embeddings_enabled {
        println!("  embeddings generated: {}", run.embedding_generated);
        println!("  embeddings failed: {}", run.embedding_failed);
    }
    println!("  errors: {}", run.errors);
    println!("  duration: {:.1}s", run.duration.as_secs_f64());
    if run.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}
