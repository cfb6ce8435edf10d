//! Sync progress reporting.
//!
//! The sync engine emits [`SyncProgressEvent`]s from a periodic ticker
//! that runs independently of worker completion. Rendering (human line,
//! JSON, nothing) is up to the caller's [`SyncProgressReporter`].

use serde::Serialize;

/// A single progress event for a sync run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncProgressEvent {
    /// Listing remote metadata. Total unknown.
    Discovering,
    /// Documents are being classified, fetched, and persisted.
    Syncing {
        processed: u64,
        total: u64,
        new: u64,
        updated: u64,
        skipped: u64,
        errors: u64,
    },
    /// Archived documents are being removed from the lexical index.
    RemovingArchived { count: u64 },
}

/// Receives progress events. Must be cheap; it is called from the ticker task.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}
