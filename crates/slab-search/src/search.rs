//! Search command and the shared query path used by the HTTP server.
//!
//! [`Searcher`] owns the SQLite-backed [`SearchEngine`] plus the optional
//! query embedder. Semantic and hybrid modes embed the query text first.
//! Neither mode quietly downgrades to keyword search: with no embedder
//! configured they return [`SearchError::MissingQueryVector`], and when
//! the embedder fails they return [`SearchError::QueryEmbedding`] carrying
//! the cause.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

use slab_search_core::embedding::Embedder;
use slab_search_core::models::{EmbeddingSlot, SearchResult};
use slab_search_core::search::{SearchEngine, SearchError, SearchMode, SearchRequest};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::fts_index::FtsIndex;
use crate::sqlite_store::SqliteStore;

/// Per-call search parameters. `None` fields fall back to `[retrieval]`
/// and `[embedding]` config.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub mode: SearchMode,
    pub lexical_weight: Option<f64>,
    pub limit: Option<usize>,
    pub slot: Option<EmbeddingSlot>,
}

#[derive(Clone)]
pub struct Searcher {
    engine: SearchEngine,
    embedder: Option<Arc<dyn Embedder>>,
    default_weight: f64,
    default_limit: usize,
    default_slot: EmbeddingSlot,
}

impl Searcher {
    pub fn new(pool: SqlitePool, config: &Config, embedder: Option<Arc<dyn Embedder>>) -> Self {
        let engine = SearchEngine::new(
            Arc::new(SqliteStore::new(pool.clone())),
            Arc::new(FtsIndex::new(pool)),
        );
        Self {
            engine,
            embedder,
            default_weight: config.retrieval.lexical_weight,
            default_limit: config.retrieval.final_limit,
            default_slot: config.embedding.slot,
        }
    }

    /// Build from config, creating the embedder if one is configured.
    pub fn from_config(pool: SqlitePool, config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(pool, config, embedder))
    }

    /// Whether an embedder is configured at all.
    pub fn semantic_available(&self) -> bool {
        self.embedder.is_some()
    }

    /// Whether semantic and hybrid modes can run right now: an embedder is
    /// configured and its health check passes.
    pub async fn semantic_ready(&self) -> bool {
        let Some(embedder) = &self.embedder else {
            return false;
        };
        match embedder.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    model = embedder.model_name(),
                    error = %format!("{:#}", e),
                    "embedding service unavailable"
                );
                false
            }
        }
    }

    pub async fn search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let lexical_weight = params.lexical_weight.unwrap_or(self.default_weight);
        if params.mode == SearchMode::Hybrid && !(0.0..=1.0).contains(&lexical_weight) {
            return Err(SearchError::InvalidWeight(lexical_weight));
        }
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let query_vec = if params.mode.needs_query_vector() {
            self.embed_query(query).await?
        } else {
            None
        };

        let request = SearchRequest {
            query,
            query_vec: query_vec.as_deref(),
            mode: params.mode,
            slot: params.slot.unwrap_or(self.default_slot),
            limit: params.limit.unwrap_or(self.default_limit),
            lexical_weight,
        };
        debug!(mode = %request.mode, slot = %request.slot, limit = request.limit, "search");
        self.engine.search(&request).await
    }

    /// `Ok(None)` when no embedder is configured.
    async fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>, SearchError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        let vec = embedder
            .embed(query)
            .await
            .map_err(SearchError::QueryEmbedding)?;
        if vec.is_empty() {
            return Err(SearchError::QueryEmbedding(anyhow::anyhow!(
                "{} returned an empty vector",
                embedder.model_name()
            )));
        }
        Ok(Some(vec))
    }
}

/// `search` command: run one query and print ranked results.
pub async fn run_search(config: &Config, query: &str, params: SearchParams) -> Result<()> {
    let pool = db::connect(config).await?;
    let searcher = Searcher::from_config(pool.clone(), config)?;

    let results = searcher.search(query, &params).await?;
    print_results(&results);

    pool.close().await;
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, r) in results.iter().enumerate() {
        let title = if r.title.is_empty() {
            "(untitled)"
        } else {
            r.title.as_str()
        };
        println!("{}. [{:.2}] {}", i + 1, r.score, title);
        if let Some(author) = &r.author {
            println!("    author: {}", author);
        }
        println!("    url: {}", r.source_url);
        println!("    key: {}", r.key);
        if let Some(fragments) = &r.fragments {
            if let Some(snippet) = fragments.get("body").and_then(|f| f.first()) {
                println!("    {}", snippet.replace('\n', " "));
            }
        }
        println!();
    }
}
