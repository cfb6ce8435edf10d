//! Remote content source abstraction.
//!
//! The sync engine only needs three calls against the remote service: one
//! bulk metadata listing, and per-document body and owner fetches. Failed
//! fetches are not retried here; the engine counts them and moves on.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Owner, RemoteDocument};

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List metadata for every document, archived ones included, in a
    /// single round trip.
    async fn list_documents(&self) -> Result<Vec<RemoteDocument>>;

    /// Fetch the long-form body of one document.
    async fn fetch_body(&self, key: &str) -> Result<String>;

    /// Fetch owner metadata. `None` when the document has no owner.
    async fn fetch_owner(&self, key: &str) -> Result<Option<Owner>>;

    /// Browsable URL for a document.
    fn document_url(&self, key: &str) -> String;
}
