//! SQLite FTS5-backed [`LexicalIndex`] implementation.
//!
//! One row per document in `documents_fts`. Ranking is FTS5 `bm25()` with
//! the title column weighted 3×; the raw rank is negated so that higher
//! is better. Fragments come from `highlight()` on the title and
//! `snippet()` on the body, wrapped in `<mark>` tags, and are only
//! reported for fields that actually matched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use slab_search_core::models::{Document, Fragments};
use slab_search_core::store::{DocumentStore, IndexedDocument, LexicalHit, LexicalIndex};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

const MARK_OPEN: &str = "<mark>";

/// FTS5 implementation of the [`LexicalIndex`] trait.
#[derive(Clone)]
pub struct FtsIndex {
    pool: SqlitePool,
}

impl FtsIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop every entry and re-index `docs` in one transaction.
    pub async fn rebuild(&self, docs: &[Document]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM documents_fts")
            .execute(&mut *tx)
            .await?;

        for doc in docs {
            let entry = IndexedDocument::from(doc);
            insert_entry(&mut *tx, &entry).await?;
        }

        tx.commit().await?;
        Ok(docs.len() as u64)
    }

    async fn run_query(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id, title, author, source_url,
                   bm25(documents_fts, 0.0, 3.0, 1.0, 1.0, 1.0, 0.0) AS rank,
                   highlight(documents_fts, 1, '<mark>', '</mark>') AS title_hl,
                   snippet(documents_fts, 2, '<mark>', '</mark>', '...', 32) AS body_snip
            FROM documents_fts
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                let title_hl: Option<String> = row.get("title_hl");
                let body_snip: Option<String> = row.get("body_snip");

                let mut fragments = Fragments::new();
                for (field, text) in [("title", title_hl), ("body", body_snip)] {
                    if let Some(text) = text.filter(|t| t.contains(MARK_OPEN)) {
                        fragments.insert(field.to_string(), vec![text]);
                    }
                }

                LexicalHit {
                    key: row.get("doc_id"),
                    score: -rank,
                    title: row.get("title"),
                    author: row.get("author"),
                    source_url: row.get("source_url"),
                    fragments,
                }
            })
            .collect();

        Ok(hits)
    }
}

async fn insert_entry(conn: &mut SqliteConnection, doc: &IndexedDocument) -> Result<()> {
    sqlx::query(
        "INSERT INTO documents_fts (doc_id, title, body, author, topics, source_url) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&doc.key)
    .bind(&doc.title)
    .bind(&doc.body)
    .bind(&doc.author)
    .bind(doc.topics.join(" "))
    .bind(&doc.source_url)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Quote each whitespace-separated term so FTS5 operators and punctuation
/// are matched literally.
pub fn quote_terms(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl LexicalIndex for FtsIndex {
    async fn index_or_replace(&self, doc: &IndexedDocument) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM documents_fts WHERE doc_id = ?")
            .bind(&doc.key)
            .execute(&mut *tx)
            .await?;
        insert_entry(&mut *tx, doc).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents_fts WHERE doc_id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The raw query is tried first so FTS5 syntax (`AND`, `"phrase"`,
    /// `prefix*`) works; if FTS5 rejects it, the terms are retried quoted.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        match self.run_query(text, limit).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                let quoted = quote_terms(text);
                if quoted.is_empty() || quoted == text {
                    return Err(e.context("Keyword query failed"));
                }
                debug!(query = text, error = %e, "retrying keyword query with quoted terms");
                self.run_query(&quoted, limit)
                    .await
                    .context("Keyword query failed")
            }
        }
    }

    async fn document_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents_fts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// Rebuild the keyword index from the non-archived rows of the store.
pub async fn run_reindex(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let index = FtsIndex::new(pool.clone());

    let docs = store.list_non_archived().await?;
    info!(documents = docs.len(), "rebuilding keyword index");
    let indexed = index.rebuild(&docs).await?;

    println!("Reindex complete: {} documents indexed", indexed);

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_terms_escapes_operators() {
        assert_eq!(quote_terms("ci/cd pipeline"), "\"ci/cd\" \"pipeline\"");
        assert_eq!(quote_terms("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
        assert_eq!(quote_terms("   "), "");
    }
}
