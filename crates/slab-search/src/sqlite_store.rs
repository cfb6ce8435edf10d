//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Maps each trait operation onto the `documents` table created by
//! [`crate::migrate`]. Timestamps are stored as fixed-width RFC 3339 text
//! with nanosecond precision, so lexical comparison is chronological and
//! `updated_at` round-trips exactly for change detection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use slab_search_core::models::{Document, EmbeddingSlot};
use slab_search_core::store::DocumentStore;

const DOCUMENT_COLUMNS: &str = "id, title, content, content_hash, author_name, author_email, \
     topics, slab_url, published_at, updated_at, archived_at, synced_at, embedding, embedding_alt";

/// SQLite implementation of the [`DocumentStore`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Overwrite one embedding slot without touching the rest of the row.
    pub async fn set_embedding(&self, key: &str, slot: EmbeddingSlot, blob: &[u8]) -> Result<()> {
        let sql = format!("UPDATE documents SET {} = ? WHERE id = ?", slot_column(slot));
        sqlx::query(&sql)
            .bind(blob)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of rows, archived ones included.
    pub async fn count_all(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of non-archived rows with a populated `slot`.
    pub async fn count_embedded(&self, slot: EmbeddingSlot) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM documents \
             WHERE archived_at IS NULL AND {col} IS NOT NULL AND length({col}) > 0",
            col = slot_column(slot)
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Most recent `synced_at` across all rows.
    pub async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT MAX(synced_at) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        raw.as_deref().map(parse_ts).transpose()
    }
}

fn slot_column(slot: EmbeddingSlot) -> &'static str {
    match slot {
        EmbeddingSlot::Primary => "embedding",
        EmbeddingSlot::Alternate => "embedding_alt",
    }
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in database: {}", raw))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let topics_json: String = row.get("topics");
    let topics: Vec<String> = serde_json::from_str(&topics_json)
        .with_context(|| format!("Invalid topics in database: {}", topics_json))?;
    let updated_at: String = row.get("updated_at");
    let synced_at: String = row.get("synced_at");

    Ok(Document {
        key: row.get("id"),
        title: row.get("title"),
        body: row.get("content"),
        content_hash: row.get("content_hash"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        topics,
        source_url: row.get("slab_url"),
        published_at: parse_opt_ts(row.get("published_at"))?,
        updated_at: parse_ts(&updated_at)?,
        archived_at: parse_opt_ts(row.get("archived_at"))?,
        synced_at: parse_ts(&synced_at)?,
        embedding: row.get("embedding"),
        embedding_alt: row.get("embedding_alt"),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        let topics = serde_json::to_string(&doc.topics)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, content_hash, author_name, author_email,
                                   topics, slab_url, published_at, updated_at, archived_at,
                                   synced_at, embedding, embedding_alt)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                content_hash = excluded.content_hash,
                author_name = excluded.author_name,
                author_email = excluded.author_email,
                topics = excluded.topics,
                slab_url = excluded.slab_url,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at,
                archived_at = COALESCE(documents.archived_at, excluded.archived_at),
                synced_at = MAX(documents.synced_at, excluded.synced_at),
                embedding = excluded.embedding,
                embedding_alt = excluded.embedding_alt
            "#,
        )
        .bind(&doc.key)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(&doc.content_hash)
        .bind(&doc.author_name)
        .bind(&doc.author_email)
        .bind(&topics)
        .bind(&doc.source_url)
        .bind(doc.published_at.as_ref().map(format_ts))
        .bind(format_ts(&doc.updated_at))
        .bind(doc.archived_at.as_ref().map(format_ts))
        .bind(format_ts(&doc.synced_at))
        .bind(&doc.embedding)
        .bind(&doc.embedding_alt)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_non_archived(&self) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE archived_at IS NULL ORDER BY updated_at DESC, id ASC",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn get_last_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT updated_at FROM documents WHERE id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        parse_opt_ts(raw)
    }

    async fn mark_archived(&self, key: &str, archived_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET archived_at = COALESCE(archived_at, ?) WHERE id = ?",
        )
        .bind(format_ts(&archived_at))
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_non_archived(&self) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE archived_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(format_ts(&a).len(), format_ts(&b).len());
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(parse_ts(&format_ts(&b)).unwrap(), b);
        assert!(format_ts(&(a + Duration::days(1))) > format_ts(&b));
    }

    #[test]
    fn bad_timestamp_is_an_error() {
        assert!(parse_ts("yesterday").is_err());
    }
}
