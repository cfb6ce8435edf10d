//! Mirror statistics.
//!
//! Summarizes what is stored and searchable: document counts in the
//! store and the keyword index, embedding coverage per slot, and the most
//! recent sync time. Used by `stats` and by `GET /health`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use slab_search_core::models::EmbeddingSlot;
use slab_search_core::store::{DocumentStore, LexicalIndex};

use crate::config::Config;
use crate::db;
use crate::fts_index::FtsIndex;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MirrorStats {
    /// Rows in the store, archived ones included.
    pub documents_total: i64,
    pub documents_active: usize,
    pub documents_indexed: u64,
    pub embedded_primary: i64,
    pub embedded_alternate: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

pub async fn collect_stats(store: &SqliteStore, index: &FtsIndex) -> Result<MirrorStats> {
    Ok(MirrorStats {
        documents_total: store.count_all().await?,
        documents_active: store.count_non_archived().await?,
        documents_indexed: index.document_count().await?,
        embedded_primary: store.count_embedded(EmbeddingSlot::Primary).await?,
        embedded_alternate: store.count_embedded(EmbeddingSlot::Alternate).await?,
        last_synced_at: store.last_synced_at().await?,
    })
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&SqliteStore::new(pool.clone()), &FtsIndex::new(pool.clone())).await;
    pool.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let active = stats.documents_active as i64;

    println!("slab-search stats");
    println!("=================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents_total);
    println!("  Active:      {}", active);
    println!("  Archived:    {}", stats.documents_total - active);
    println!("  Indexed:     {}", stats.documents_indexed);
    println!(
        "  Embedded:    primary {} / {} ({}%), alternate {} / {} ({}%)",
        stats.embedded_primary,
        active,
        percent(stats.embedded_primary, active),
        stats.embedded_alternate,
        active,
        percent(stats.embedded_alternate, active),
    );
    match stats.last_synced_at {
        Some(ts) => println!("  Last sync:   {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last sync:   never"),
    }

    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn percent_handles_empty_store() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 4), 25);
    }
}
