//! # slab-search core
//!
//! Shared logic for slab-search: data models, the embedding codec, the
//! adapter traits the engines run against, the change-detection sync
//! engine, and the hybrid retrieval engine.
//!
//! This crate contains no sqlx, HTTP client, or filesystem I/O. Concrete
//! adapters (SQLite store, FTS5 index, Slab client, embedding services)
//! live in the `slab-search` app crate; in-memory adapters for tests live in
//! [`store::memory`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Document`, `RemoteDocument`, `SearchResult`, embedding slots |
//! | [`embedding`] | Vector codec, cosine similarity, `Embedder` trait |
//! | [`store`] | `DocumentStore` and `LexicalIndex` traits |
//! | [`source`] | `RemoteSource` trait for the remote content service |
//! | [`search`] | Keyword, vector, and hybrid retrieval |
//! | [`sync`] | Change-detection sync engine and `SyncRun` statistics |
//! | [`progress`] | Progress reporting trait used during sync |

pub mod embedding;
pub mod models;
pub mod progress;
pub mod search;
pub mod source;
pub mod store;
pub mod sync;
