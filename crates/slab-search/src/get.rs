//! Document retrieval by key.
//!
//! Used by both the `get` CLI command and `GET /api/doc` on the server.

use anyhow::{anyhow, Result};
use serde::Serialize;

use slab_search_core::models::Document;
use slab_search_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// JSON shape of a stored document. Embedding BLOBs are summarized as
/// dimension counts.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub topics: Vec<String>,
    pub source_url: String,
    pub published_at: Option<String>,
    pub updated_at: String,
    pub archived_at: Option<String>,
    pub synced_at: String,
    pub content_hash: String,
    pub embedding_dims: Option<usize>,
    pub embedding_alt_dims: Option<usize>,
    pub body: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        let dims = |blob: &Option<Vec<u8>>| {
            blob.as_ref()
                .filter(|b| !b.is_empty() && b.len() % 4 == 0)
                .map(|b| b.len() / 4)
        };
        DocumentResponse {
            embedding_dims: dims(&doc.embedding),
            embedding_alt_dims: dims(&doc.embedding_alt),
            id: doc.key,
            title: doc.title,
            author: doc.author_name,
            author_email: doc.author_email,
            topics: doc.topics,
            source_url: doc.source_url,
            published_at: doc.published_at.map(|t| t.to_rfc3339()),
            updated_at: doc.updated_at.to_rfc3339(),
            archived_at: doc.archived_at.map(|t| t.to_rfc3339()),
            synced_at: doc.synced_at.to_rfc3339(),
            content_hash: doc.content_hash,
            body: doc.body,
        }
    }
}

/// Look up one document. Archived documents are still returned; their
/// `archived_at` is set.
pub async fn get_document(store: &SqliteStore, key: &str) -> Result<Option<DocumentResponse>> {
    Ok(store.get_by_key(key).await?.map(DocumentResponse::from))
}

pub async fn run_get(config: &Config, key: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let doc = get_document(&store, key).await;
    pool.close().await;
    let doc = doc?.ok_or_else(|| anyhow!("document not found: {}", key))?;

    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!("title:      {}", doc.title);
    println!("author:     {}", doc.author.as_deref().unwrap_or(""));
    println!("url:        {}", doc.source_url);
    if !doc.topics.is_empty() {
        println!("topics:     {}", doc.topics.join(", "));
    }
    println!("updated:    {}", doc.updated_at);
    println!("synced:     {}", doc.synced_at);
    if let Some(archived) = &doc.archived_at {
        println!("archived:   {}", archived);
    }
    println!(
        "embeddings: primary={} alternate={}",
        doc.embedding_dims.map_or_else(|| "none".to_string(), |d| format!("{}d", d)),
        doc.embedding_alt_dims.map_or_else(|| "none".to_string(), |d| format!("{}d", d)),
    );
    println!();
    println!("{}", doc.body);

    Ok(())
}
