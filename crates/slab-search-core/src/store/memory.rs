//! In-memory [`DocumentStore`] and [`LexicalIndex`] implementations for
//! tests and embedding in other tools.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Keyword
//! search is naive term counting (title hits weigh 3×); it exists so the
//! engines can be exercised without SQLite.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Document, Fragments};

use super::{DocumentStore, IndexedDocument, LexicalHit, LexicalIndex};

/// In-memory document store.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory lock poisoned")
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let mut next = doc.clone();
        if let Some(prev) = docs.get(&doc.key) {
            next.synced_at = next.synced_at.max(prev.synced_at);
            next.archived_at = prev.archived_at.or(next.archived_at);
        }
        docs.insert(doc.key.clone(), next);
        Ok(())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(key).cloned())
    }

    async fn list_non_archived(&self) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| d.archived_at.is_none())
            .cloned()
            .collect();
        // Same order as the SQLite store: most recently updated first.
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.key.cmp(&b.key)));
        Ok(out)
    }

    async fn get_last_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(key).map(|d| d.updated_at))
    }

    async fn mark_archived(&self, key: &str, archived_at: DateTime<Utc>) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        match docs.get_mut(key) {
            Some(doc) => {
                doc.archived_at.get_or_insert(archived_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_non_archived(&self) -> Result<usize> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.values().filter(|d| d.archived_at.is_none()).count())
    }
}

/// In-memory lexical index.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, IndexedDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }
}

fn count_terms(haystack: &str, terms: &[String]) -> usize {
    let lower = haystack.to_lowercase();
    terms.iter().map(|t| lower.matches(t.as_str()).count()).sum()
}

#[async_trait]
impl LexicalIndex for InMemoryIndex {
    async fn index_or_replace(&self, doc: &IndexedDocument) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(doc.key.clone(), doc.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let terms: Vec<String> = text.split_whitespace().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().map_err(poisoned)?;
        let mut hits: Vec<LexicalHit> = entries
            .values()
            .filter_map(|doc| {
                let title_hits = count_terms(&doc.title, &terms);
                let body_hits = count_terms(&doc.body, &terms);
                let score = (title_hits * 3 + body_hits) as f64;
                if score == 0.0 {
                    return None;
                }
                let mut fragments = Fragments::new();
                if body_hits > 0 {
                    fragments.insert(
                        "body".to_string(),
                        vec![doc.body.chars().take(240).collect()],
                    );
                }
                Some(LexicalHit {
                    key: doc.key.clone(),
                    score,
                    title: doc.title.clone(),
                    author: doc.author.clone(),
                    source_url: doc.source_url.clone(),
                    fragments,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.key.cmp(&b.key))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn document_count(&self) -> Result<u64> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.len() as u64)
    }
}
