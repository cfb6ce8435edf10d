//! Core data models shared by the sync and retrieval engines.
//!
//! [`RemoteDocument`] is what the remote source lists in bulk, [`Document`]
//! is the persisted mirror row, and [`SearchResult`] is what every retrieval
//! mode returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Named embedding slot on a [`Document`].
///
/// Two slots let a primary model and an alternate model coexist so they can
/// be compared over the same corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSlot {
    #[default]
    Primary,
    Alternate,
}

impl EmbeddingSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingSlot::Primary => "primary",
            EmbeddingSlot::Alternate => "alternate",
        }
    }
}

impl fmt::Display for EmbeddingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(EmbeddingSlot::Primary),
            "alternate" => Ok(EmbeddingSlot::Alternate),
            other => anyhow::bail!(
                "Unknown embedding slot: '{}'. Use primary or alternate.",
                other
            ),
        }
    }
}

/// A topic label attached to a remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Owner (author) metadata fetched per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Lightweight metadata returned by the bulk remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub key: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub topics: Vec<Topic>,
}

impl RemoteDocument {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// A mirrored document as persisted in the relational store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub title: String,
    /// Markdown body. Opaque to the engines.
    pub body: String,
    pub content_hash: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub topics: Vec<String>,
    pub source_url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Authoritative change signal from the remote source.
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    /// Last successful local persistence.
    pub synced_at: DateTime<Utc>,
    pub embedding: Option<Vec<u8>>,
    pub embedding_alt: Option<Vec<u8>>,
}

impl Document {
    /// Raw codec bytes stored in `slot`, if any.
    pub fn embedding_bytes(&self, slot: EmbeddingSlot) -> Option<&[u8]> {
        match slot {
            EmbeddingSlot::Primary => self.embedding.as_deref(),
            EmbeddingSlot::Alternate => self.embedding_alt.as_deref(),
        }
    }

    pub fn set_embedding_bytes(&mut self, slot: EmbeddingSlot, bytes: Option<Vec<u8>>) {
        match slot {
            EmbeddingSlot::Primary => self.embedding = bytes,
            EmbeddingSlot::Alternate => self.embedding_alt = bytes,
        }
    }

    /// The text sent to the embedding service for this document.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }
}

/// Fragment map keyed by field name (`title`, `body`).
pub type Fragments = HashMap<String, Vec<String>>;

/// A single ranked retrieval result.
///
/// The score scale depends on the mode that produced it: adapter-defined
/// relevance for keyword, cosine similarity for vector, and a fused value in
/// `[0, 1]` for hybrid. Scores are only comparable within one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub source_url: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragments: Option<Fragments>,
}
