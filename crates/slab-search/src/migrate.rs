//! Database schema migrations (idempotent).

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Timestamps are fixed-width RFC 3339 text, so MAX() and ORDER BY work
    // lexically.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            author_name TEXT,
            author_email TEXT,
            topics TEXT NOT NULL DEFAULT '[]',
            slab_url TEXT NOT NULL,
            published_at TEXT,
            updated_at TEXT NOT NULL,
            archived_at TEXT,
            synced_at TEXT NOT NULL,
            embedding BLOB,
            embedding_alt BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                doc_id UNINDEXED,
                title,
                body,
                author,
                topics,
                source_url UNINDEXED,
                tokenize = 'porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_documents_author ON documents(author_name)",
        "CREATE INDEX IF NOT EXISTS idx_documents_published_at ON documents(published_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_documents_archived_at ON documents(archived_at)",
        "CREATE INDEX IF NOT EXISTS idx_documents_synced_at ON documents(synced_at DESC)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}
