//! # slab-search
//!
//! A local, searchable mirror of a Slab workspace.
//!
//! `sync` pulls the document listing from Slab, fetches only new or changed
//! documents, optionally embeds them, and stores everything in SQLite with
//! an FTS5 keyword index. Searches run locally in keyword, semantic, or
//! hybrid mode from the CLI or the JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────┐
//! │  Slab API   │──▶│ Sync engine │──▶│  SQLite   │
//! │ GraphQL+MD  │   │ diff+embed  │   │ rows+FTS5 │
//! └─────────────┘   └─────────────┘   └─────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! slab-search init
//! SLAB_TOKEN=... slab-search sync
//! slab-search search "incident runbook" --mode keyword
//! slab-search serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | `DocumentStore` over the `documents` table |
//! | [`fts_index`] | `LexicalIndex` over FTS5, plus `reindex` |
//! | [`slab`] | Slab GraphQL and markdown export client |
//! | [`embedding`] | Ollama and LM Studio embedders |
//! | [`ingest`] | `sync` command |
//! | [`search`] | `search` command and shared query path |
//! | [`embed_cmd`] | `embed` backfill command |
//! | [`get`] / [`stats`] | Document lookup and mirror statistics |
//! | [`server`] | JSON HTTP API |
//! | [`progress`] | Sync progress reporters |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod fts_index;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod server;
pub mod slab;
pub mod sqlite_store;
pub mod stats;
