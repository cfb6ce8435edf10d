//! Change-detection sync engine.
//!
//! A run pulls the remote metadata listing once, classifies every entry,
//! and streams only new or changed documents through a fixed-size worker
//! pool into the [`DocumentStore`] and [`LexicalIndex`].
//!
//! # Classification
//!
//! | Remote state | Local state | Outcome | Counter |
//! |--------------|-------------|---------|---------|
//! | archived | any | index entry deleted | `archived_removed` |
//! | active | same `updated_at` | nothing fetched | `skipped` |
//! | active | unknown key | fetched and stored | `new` |
//! | active | other `updated_at` | fetched and replaced | `updated` |
//!
//! The cheap `get_last_updated_at` read always happens before any body
//! fetch, so an unchanged document costs one point lookup.
//!
//! # Failure model
//!
//! Only the initial listing is fatal. Per-document failures (fetch,
//! persist, index) are logged and counted under `errors`; embedding
//! failures are counted under `embedding_failed` and the document is still
//! persisted with whatever vector it had before.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::embedding::{vec_to_blob, Embedder};
use crate::models::{Document, EmbeddingSlot, RemoteDocument};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::source::RemoteSource;
use crate::store::{DocumentStore, IndexedDocument, LexicalIndex};

/// Worker count used by the bundled configuration.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Tuning for a single sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Number of workers draining the queue.
    pub concurrency: usize,
    /// Cap on the active (non-archived) set, for bounded staging runs.
    pub max_documents: Option<usize>,
    pub progress_interval: Duration,
    /// Slot new embeddings are written to.
    pub embedding_slot: EmbeddingSlot,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_documents: None,
            progress_interval: Duration::from_secs(5),
            embedding_slot: EmbeddingSlot::Primary,
        }
    }
}

/// Statistics for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncRun {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Active documents after the cap, plus archived documents.
    pub total: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub archived_removed: u64,
    pub embedding_generated: u64,
    pub embedding_failed: u64,
    pub errors: u64,
    pub embeddings_enabled: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    New,
    Changed,
}

struct WorkItem {
    remote: RemoteDocument,
    change: Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbeddingOutcome {
    Disabled,
    Generated,
    Reused,
    Failed,
}

#[derive(Default)]
struct RunState {
    run: SyncRun,
    processed: u64,
    active_total: u64,
}

impl RunState {
    fn progress_event(&self) -> SyncProgressEvent {
        SyncProgressEvent::Syncing {
            processed: self.processed,
            total: self.active_total,
            new: self.run.new,
            updated: self.run.updated,
            skipped: self.run.skipped,
            errors: self.run.errors,
        }
    }
}

/// The single guard around every counter of a run.
#[derive(Clone, Default)]
struct SharedState(Arc<Mutex<RunState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Everything a worker needs, shared by all workers.
struct WorkerContext {
    source: Arc<dyn RemoteSource>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn LexicalIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    slot: EmbeddingSlot,
    state: SharedState,
}

/// Orchestrates sync runs against one source, store, and index.
pub struct SyncEngine {
    source: Arc<dyn RemoteSource>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn LexicalIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn LexicalIndex>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            store,
            index,
            embedder: None,
            options,
        }
    }

    /// Generate embeddings during sync with `embedder`.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Execute one sync run.
    ///
    /// Returns `Err` only when the remote listing fails. When `cancel`
    /// fires, no new documents are started, in-flight ones finish, the
    /// archived pass is skipped, and the returned run has `cancelled` set.
    pub async fn run(
        &self,
        progress: Arc<dyn SyncProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<SyncRun> {
        if self.options.concurrency == 0 {
            bail!("sync concurrency must be at least 1");
        }

        let started_at = Utc::now();
        let clock = Instant::now();

        progress.report(SyncProgressEvent::Discovering);
        let remote = self
            .source
            .list_documents()
            .await
            .context("failed to list remote documents")?;

        let (archived, mut active): (Vec<RemoteDocument>, Vec<RemoteDocument>) =
            remote.into_iter().partition(|d| d.is_archived());
        if let Some(cap) = self.options.max_documents {
            active.truncate(cap);
        }

        info!(
            active = active.len(),
            archived = archived.len(),
            concurrency = self.options.concurrency,
            "starting sync"
        );

        let embedder = self.check_embedder().await;

        let state = SharedState::default();
        {
            let mut s = state.lock();
            s.run.started_at = started_at;
            s.run.total = (active.len() + archived.len()) as u64;
            s.run.embeddings_enabled = embedder.is_some();
            s.active_total = active.len() as u64;
        }

        let ticker_stop = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            state.clone(),
            progress.clone(),
            self.options.progress_interval,
            ticker_stop.clone(),
        ));

        let ctx = Arc::new(WorkerContext {
            source: self.source.clone(),
            store: self.store.clone(),
            index: self.index.clone(),
            embedder,
            slot: self.options.embedding_slot,
            state: state.clone(),
        });

        let (tx, rx) = mpsc::channel::<WorkItem>(self.options.concurrency * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..self.options.concurrency {
            workers.spawn(worker_loop(ctx.clone(), rx.clone(), cancel.clone()));
        }

        self.dispatch(active, &tx, &state, cancel).await;
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "sync worker terminated abnormally");
            }
        }

        ticker_stop.cancel();
        if let Err(e) = ticker.await {
            warn!(error = %e, "progress ticker terminated abnormally");
        }
        progress.report(state.lock().progress_event());

        if cancel.is_cancelled() {
            info!("sync cancelled; skipping archived pass");
            state.lock().run.cancelled = true;
        } else {
            self.remove_archived(&archived, &state, progress.as_ref(), cancel)
                .await;
        }

        let mut run = state.lock().run.clone();
        run.duration = clock.elapsed();

        info!(
            new = run.new,
            updated = run.updated,
            skipped = run.skipped,
            archived_removed = run.archived_removed,
            embedding_generated = run.embedding_generated,
            embedding_failed = run.embedding_failed,
            errors = run.errors,
            cancelled = run.cancelled,
            duration_ms = run.duration.as_millis() as u64,
            "sync complete"
        );

        Ok(run)
    }

    /// Health-check the embedder once. `None` disables embedding for the run.
    async fn check_embedder(&self) -> Option<Arc<dyn Embedder>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.health_check().await {
            Ok(()) => {
                info!(model = embedder.model_name(), "embedding enabled for this run");
                Some(embedder.clone())
            }
            Err(e) => {
                warn!(
                    model = embedder.model_name(),
                    error = %format!("{:#}", e),
                    "embedding service unavailable; continuing without embeddings"
                );
                None
            }
        }
    }

    /// Classify each active document and enqueue the ones needing work.
    async fn dispatch(
        &self,
        active: Vec<RemoteDocument>,
        tx: &mpsc::Sender<WorkItem>,
        state: &SharedState,
        cancel: &CancellationToken,
    ) {
        for remote in active {
            if cancel.is_cancelled() {
                break;
            }

            let change = match self.store.get_last_updated_at(&remote.key).await {
                Ok(None) => Change::New,
                Ok(Some(stored)) if stored == remote.updated_at => {
                    debug!(key = %remote.key, "unchanged, skipping");
                    let mut s = state.lock();
                    s.run.skipped += 1;
                    s.processed += 1;
                    continue;
                }
                Ok(Some(_)) => Change::Changed,
                Err(e) => {
                    warn!(key = %remote.key, error = %format!("{:#}", e), "change check failed");
                    let mut s = state.lock();
                    s.run.errors += 1;
                    s.processed += 1;
                    continue;
                }
            };

            let item = WorkItem { remote, change };
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Delete archived documents from the lexical index, one at a time.
    async fn remove_archived(
        &self,
        archived: &[RemoteDocument],
        state: &SharedState,
        progress: &dyn SyncProgressReporter,
        cancel: &CancellationToken,
    ) {
        if archived.is_empty() {
            return;
        }
        progress.report(SyncProgressEvent::RemovingArchived {
            count: archived.len() as u64,
        });

        for remote in archived {
            if cancel.is_cancelled() {
                state.lock().run.cancelled = true;
                break;
            }
            if let Err(e) = self.index.delete(&remote.key).await {
                warn!(
                    key = %remote.key,
                    error = %format!("{:#}", e),
                    "failed to remove archived document from index"
                );
                state.lock().run.errors += 1;
                continue;
            }
            if let Some(archived_at) = remote.archived_at {
                if let Err(e) = self.store.mark_archived(&remote.key, archived_at).await {
                    warn!(
                        key = %remote.key,
                        error = %format!("{:#}", e),
                        "failed to stamp archived_at"
                    );
                    state.lock().run.errors += 1;
                    continue;
                }
            }
            debug!(key = %remote.key, "archived document removed from index");
            state.lock().run.archived_removed += 1;
        }
    }
}

async fn run_ticker(
    state: SharedState,
    progress: Arc<dyn SyncProgressReporter>,
    interval: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let event = state.lock().progress_event();
                progress.report(event);
            }
        }
    }
}

async fn worker_loop(
    ctx: Arc<WorkerContext>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>,
    cancel: CancellationToken,
) {
    loop {
        let item = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => item,
            }
        };
        let Some(item) = item else { break };
        ctx.process(item).await;
    }
}

impl WorkerContext {
    async fn process(&self, item: WorkItem) {
        let result = self.sync_document(&item).await;

        let mut s = self.state.lock();
        s.processed += 1;
        match result {
            Ok(embedding) => {
                match item.change {
                    Change::New => s.run.new += 1,
                    Change::Changed => s.run.updated += 1,
                }
                match embedding {
                    EmbeddingOutcome::Generated => s.run.embedding_generated += 1,
                    EmbeddingOutcome::Failed => s.run.embedding_failed += 1,
                    EmbeddingOutcome::Reused | EmbeddingOutcome::Disabled => {}
                }
                debug!(
                    key = %item.remote.key,
                    change = ?item.change,
                    embedding = ?embedding,
                    "document synced"
                );
            }
            Err(e) => {
                s.run.errors += 1;
                drop(s);
                warn!(
                    key = %item.remote.key,
                    title = %item.remote.title,
                    error = %format!("{:#}", e),
                    "error syncing document"
                );
            }
        }
    }

    async fn sync_document(&self, item: &WorkItem) -> Result<EmbeddingOutcome> {
        let remote = &item.remote;
        let key = remote.key.as_str();

        let body = self
            .source
            .fetch_body(key)
            .await
            .with_context(|| format!("fetch body for {}", key))?;
        let owner = self
            .source
            .fetch_owner(key)
            .await
            .with_context(|| format!("fetch owner for {}", key))?;

        let previous = match item.change {
            Change::Changed => self
                .store
                .get_by_key(key)
                .await
                .with_context(|| format!("load stored document {}", key))?,
            Change::New => None,
        };

        let mut doc = Document {
            key: remote.key.clone(),
            title: remote.title.clone(),
            content_hash: content_hash(&body),
            body,
            author_name: owner.as_ref().map(|o| o.name.clone()),
            author_email: owner.and_then(|o| o.email),
            topics: remote
                .topics
                .iter()
                .map(|t| {
                    if t.name.is_empty() {
                        t.id.clone()
                    } else {
                        t.name.clone()
                    }
                })
                .collect(),
            source_url: self.source.document_url(key),
            published_at: remote.published_at,
            updated_at: remote.updated_at,
            archived_at: None,
            synced_at: Utc::now(),
            embedding: previous.as_ref().and_then(|p| p.embedding.clone()),
            embedding_alt: previous.as_ref().and_then(|p| p.embedding_alt.clone()),
        };

        let outcome = self.embed(&mut doc, previous.as_ref()).await;

        self.store
            .upsert(&doc)
            .await
            .with_context(|| format!("upsert document {}", key))?;
        self.index
            .index_or_replace(&IndexedDocument::from(&doc))
            .await
            .with_context(|| format!("index document {}", key))?;

        Ok(outcome)
    }

    /// Fill the target slot on `doc`. Never fails the document.
    async fn embed(&self, doc: &mut Document, previous: Option<&Document>) -> EmbeddingOutcome {
        let Some(embedder) = &self.embedder else {
            return EmbeddingOutcome::Disabled;
        };

        let unchanged_body = previous
            .map(|p| p.content_hash == doc.content_hash && p.embedding_bytes(self.slot).is_some())
            .unwrap_or(false);
        if unchanged_body {
            return EmbeddingOutcome::Reused;
        }

        match embedder.embed(&doc.embedding_text()).await {
            Ok(vec) if !vec.is_empty() => {
                doc.set_embedding_bytes(self.slot, Some(vec_to_blob(&vec)));
                EmbeddingOutcome::Generated
            }
            Ok(_) => {
                warn!(key = %doc.key, "embedding service returned an empty vector");
                EmbeddingOutcome::Failed
            }
            Err(e) => {
                warn!(
                    key = %doc.key,
                    error = %format!("{:#}", e),
                    "embedding failed; keeping previous vector"
                );
                EmbeddingOutcome::Failed
            }
        }
    }
}

/// Hex SHA-256 of a document body.
pub fn content_hash(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
