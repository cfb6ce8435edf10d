//! Storage abstractions used by the sync and retrieval engines.
//!
//! Two seams are defined here:
//!
//! - [`DocumentStore`]: the relational mirror (upsert-by-key, point
//!   lookups, the non-archived listing the vector scan runs over).
//! - [`LexicalIndex`]: the full-text engine (index-or-replace, delete,
//!   ranked free-text query with highlighted fragments).
//!
//! Implementations must be `Send + Sync` and safe for concurrent use by
//! many sync workers; the engines do no locking of their own around them.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Document, Fragments};

/// Abstract relational store for mirrored documents.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](DocumentStore::upsert) | Insert or replace a document by key |
/// | [`get_by_key`](DocumentStore::get_by_key) | Point lookup |
/// | [`list_non_archived`](DocumentStore::list_non_archived) | Every retrievable document |
/// | [`get_last_updated_at`](DocumentStore::get_last_updated_at) | Cheap change-detection projection |
/// | [`mark_archived`](DocumentStore::mark_archived) | Stamp `archived_at` without touching content |
/// | [`count_non_archived`](DocumentStore::count_non_archived) | Retrievable document count |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or update a document.
    ///
    /// Implementations keep `synced_at` monotonically non-decreasing and
    /// never clear a previously stored `archived_at`.
    async fn upsert(&self, doc: &Document) -> Result<()>;

    async fn get_by_key(&self, key: &str) -> Result<Option<Document>>;

    /// All documents whose `archived_at` is unset.
    async fn list_non_archived(&self) -> Result<Vec<Document>>;

    /// The stored `updated_at` for `key`, or `None` if the key is unknown.
    async fn get_last_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>>;

    /// Set `archived_at` on an existing row if it is not already set.
    ///
    /// Returns `true` if a row with this key exists.
    async fn mark_archived(&self, key: &str, archived_at: DateTime<Utc>) -> Result<bool>;

    async fn count_non_archived(&self) -> Result<usize>;
}

/// Fields handed to the lexical index for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub key: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub topics: Vec<String>,
    pub source_url: String,
}

impl From<&Document> for IndexedDocument {
    fn from(doc: &Document) -> Self {
        Self {
            key: doc.key.clone(),
            title: doc.title.clone(),
            body: doc.body.clone(),
            author: doc.author_name.clone(),
            topics: doc.topics.clone(),
            source_url: doc.source_url.clone(),
        }
    }
}

/// A ranked hit from the lexical index.
///
/// `score` is index-defined (unbounded, higher is better) and must never be
/// compared with cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub key: String,
    pub score: f64,
    pub title: String,
    pub author: Option<String>,
    pub source_url: String,
    pub fragments: Fragments,
}

/// Abstract full-text index.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Index a document, replacing any existing entry with the same key.
    async fn index_or_replace(&self, doc: &IndexedDocument) -> Result<()>;

    /// Remove the entry for `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Run a free-text query, returning at most `limit` hits sorted by
    /// score descending.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<LexicalHit>>;

    async fn document_count(&self) -> Result<u64>;
}
