#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

use slab_search::db;
use slab_search::migrate::apply_schema;
use slab_search_core::embedding::Embedder;
use slab_search_core::models::{Document, Owner, RemoteDocument, Topic};
use slab_search_core::source::RemoteSource;
use slab_search_core::sync::content_hash;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Fresh database with the schema applied. Keep the `TempDir` alive for
/// the duration of the test.
pub async fn temp_db() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("data/slab.db"))
        .await
        .unwrap();
    apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

pub fn document(key: &str, title: &str, body: &str, updated: i64) -> Document {
    Document {
        key: key.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        content_hash: content_hash(body),
        author_name: Some("Grace Hopper".to_string()),
        author_email: Some("grace@example.test".to_string()),
        topics: vec!["Engineering".to_string()],
        source_url: format!("https://slab.example.test/posts/{}", key),
        published_at: Some(ts(updated - 100)),
        updated_at: ts(updated),
        archived_at: None,
        synced_at: ts(updated + 5),
        embedding: None,
        embedding_alt: None,
    }
}

pub fn remote(key: &str, title: &str, updated: i64) -> RemoteDocument {
    RemoteDocument {
        key: key.to_string(),
        title: title.to_string(),
        published_at: Some(ts(updated - 100)),
        updated_at: ts(updated),
        archived_at: None,
        topics: vec![Topic {
            id: "t-eng".to_string(),
            name: "Engineering".to_string(),
        }],
    }
}

/// In-process stand-in for the Slab API that counts body fetches.
#[derive(Default)]
pub struct FakeSlab {
    pub docs: Mutex<Vec<RemoteDocument>>,
    pub bodies: Mutex<HashMap<String, String>>,
    pub failing: HashSet<String>,
    pub body_fetches: AtomicUsize,
}

impl FakeSlab {
    pub fn new(entries: Vec<(RemoteDocument, &str)>) -> Self {
        let bodies = entries
            .iter()
            .map(|(d, body)| (d.key.clone(), body.to_string()))
            .collect();
        Self {
            docs: Mutex::new(entries.into_iter().map(|(d, _)| d).collect()),
            bodies: Mutex::new(bodies),
            ..Default::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.body_fetches.load(Ordering::SeqCst)
    }

    pub fn update(&self, key: &str, updated: i64, body: &str) {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs.iter_mut().find(|d| d.key == key).unwrap();
        doc.updated_at = ts(updated);
        self.bodies
            .lock()
            .unwrap()
            .insert(key.to_string(), body.to_string());
    }

    pub fn archive(&self, key: &str, at: i64) {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs.iter_mut().find(|d| d.key == key).unwrap();
        doc.archived_at = Some(ts(at));
    }
}

#[async_trait]
impl RemoteSource for FakeSlab {
    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        Ok(self.docs.lock().unwrap().clone())
    }

    async fn fetch_body(&self, key: &str) -> Result<String> {
        self.body_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(key) {
            bail!("unexpected status exporting {}: 502 Bad Gateway", key);
        }
        Ok(self.bodies.lock().unwrap().get(key).cloned().unwrap_or_default())
    }

    async fn fetch_owner(&self, _key: &str) -> Result<Option<Owner>> {
        Ok(Some(Owner {
            name: "Grace Hopper".to_string(),
            email: Some("grace@example.test".to_string()),
        }))
    }

    fn document_url(&self, key: &str) -> String {
        format!("https://slab.example.test/posts/{}", key)
    }
}

/// Deterministic embedder: a document mentioning "deploy" points along
/// the first axis, everything else along the second.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.to_lowercase().contains("deploy") {
            Ok(vec![1.0, 0.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0, 0.0])
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
