//! `embed` command: backfill document embeddings.
//!
//! Walks non-archived documents in key order and writes one embedding
//! slot per document, sequentially. `--start-from` resumes an interrupted
//! run at a given key; `--missing-only` skips documents whose slot is
//! already populated.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use slab_search_core::embedding::{vec_to_blob, Embedder};
use slab_search_core::models::EmbeddingSlot;
use slab_search_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteStore;

/// Documents between progress lines.
pub const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    pub slot: EmbeddingSlot,
    /// Skip documents ordered before this key.
    pub start_from: Option<String>,
    pub missing_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub considered: usize,
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Embed every eligible document into `options.slot`.
///
/// A failed or empty embedding is counted and the walk continues; a
/// failed write aborts the run.
pub async fn backfill(
    store: &SqliteStore,
    embedder: &dyn Embedder,
    options: &BackfillOptions,
) -> Result<BackfillStats> {
    let mut docs = store.list_non_archived().await?;
    docs.sort_by(|a, b| a.key.cmp(&b.key));

    if let Some(start) = &options.start_from {
        match docs.iter().position(|d| &d.key == start) {
            Some(pos) => {
                docs.drain(..pos);
            }
            None => bail!("start-from key not found among active documents: {}", start),
        }
    }

    let total = docs.len();
    let mut stats = BackfillStats::default();

    for (i, doc) in docs.iter().enumerate() {
        stats.considered += 1;

        if options.missing_only && doc.embedding_bytes(options.slot).is_some() {
            stats.skipped += 1;
        } else {
            match embedder.embed(&doc.embedding_text()).await {
                Ok(vec) if !vec.is_empty() => {
                    store
                        .set_embedding(&doc.key, options.slot, &vec_to_blob(&vec))
                        .await
                        .with_context(|| format!("Failed to store embedding for {}", doc.key))?;
                    stats.embedded += 1;
                }
                Ok(_) => {
                    warn!(key = %doc.key, "embedder returned an empty vector");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(key = %doc.key, error = %e, "embedding failed");
                    stats.failed += 1;
                }
            }
        }

        if (i + 1) % PROGRESS_EVERY == 0 {
            eprintln!(
                "Progress: {}/{} - {} embedded, {} failed (last key: {})",
                i + 1,
                total,
                stats.embedded,
                stats.failed,
                doc.key
            );
        }
    }

    Ok(stats)
}

pub async fn run_embed(
    config: &Config,
    start_from: Option<String>,
    missing_only: bool,
) -> Result<()> {
    let embedder = match create_embedder(&config.embedding)? {
        Some(e) => e,
        None => bail!("Embedding provider is disabled. Set [embedding] provider in config."),
    };
    embedder
        .health_check()
        .await
        .with_context(|| format!("Embedding service check failed for {}", embedder.model_name()))?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let options = BackfillOptions {
        slot: config.embedding.slot,
        start_from,
        missing_only,
    };
    info!(model = embedder.model_name(), slot = %options.slot, "embedding backfill");

    let stats = backfill(&store, embedder.as_ref(), &options).await;
    pool.close().await;
    let stats = stats?;

    println!("embed {}", options.slot);
    println!("  model: {}", embedder.model_name());
    println!("  documents: {}", stats.considered);
    println!("  embedded: {}", stats.embedded);
    println!("  skipped: {}", stats.skipped);
    println!("  failed: {}", stats.failed);
    println!("ok");

    Ok(())
}
