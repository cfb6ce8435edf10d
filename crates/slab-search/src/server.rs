//! JSON HTTP API over the local mirror.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/search?q=&mode=&weight=&limit=&slot=` | Keyword, semantic, or hybrid search |
//! | `GET`  | `/api/doc?id=` | One stored document |
//! | `GET`  | `/health` | Counts and whether semantic search is usable right now |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `not_found` (404), `internal` (500), `embeddings_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends
//! can query the API directly.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use slab_search_core::models::{EmbeddingSlot, SearchResult};
use slab_search_core::search::{SearchError, SearchMode};

use crate::config::Config;
use crate::db;
use crate::fts_index::FtsIndex;
use crate::get::{get_document, DocumentResponse};
use crate::search::{SearchParams, Searcher};
use crate::sqlite_store::SqliteStore;
use crate::stats::collect_stats;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    searcher: Arc<Searcher>,
    store: SqliteStore,
    index: FtsIndex,
}

impl AppState {
    pub fn new(searcher: Searcher, store: SqliteStore, index: FtsIndex) -> Self {
        Self {
            searcher: Arc::new(searcher),
            store,
            index,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", get(handle_search))
        .route("/api/doc", get(handle_doc))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let searcher = Searcher::from_config(pool.clone(), config)?;
    if !searcher.semantic_available() {
        info!("embedding provider disabled; semantic and hybrid search unavailable");
    } else if !searcher.semantic_ready().await {
        warn!(
            "embedding service not reachable at startup; \
             semantic and hybrid search fail until it is"
        );
    }
    let state = AppState::new(
        searcher,
        SqliteStore::new(pool.clone()),
        FtsIndex::new(pool),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("slab-search listening on http://{}", config.server.bind);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            e if e.is_invalid_argument() => bad_request(e.to_string()),
            e @ SearchError::MissingQueryVector => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "embeddings_disabled",
                message: e.to_string(),
            },
            e @ SearchError::QueryEmbedding(_) => {
                warn!(error = %e, "query embedding failed");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "embeddings_unavailable",
                    message: e.to_string(),
                }
            }
            SearchError::Backend(e) => internal(e),
            e => internal(anyhow::Error::new(e)),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    documents: usize,
    indexed: u64,
    /// Embedder configured and passing its health check.
    semantic_search: bool,
}

async fn handle_health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, AppError> {
    let stats = collect_stats(&state.store, &state.index)
        .await
        .map_err(internal)?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        documents: stats.documents_active,
        indexed: stats.documents_indexed,
        semantic_search: state.searcher.semantic_ready().await,
    }))
}

// ============ GET /api/search ============

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    mode: Option<String>,
    weight: Option<f64>,
    limit: Option<usize>,
    slot: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    mode: &'static str,
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let mode: SearchMode = match query.mode.as_deref() {
        Some(m) => m.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?,
        None => SearchMode::default(),
    };
    let slot: Option<EmbeddingSlot> = query
        .slot
        .as_deref()
        .map(|s| s.parse::<EmbeddingSlot>())
        .transpose()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;
    if query.limit == Some(0) {
        return Err(bad_request("limit must be >= 1"));
    }

    let params = SearchParams {
        mode,
        lexical_weight: query.weight,
        limit: query.limit,
        slot,
    };
    let results = state.searcher.search(&query.q, &params).await?;

    Ok(Json(SearchResponse {
        mode: mode.as_str(),
        results,
    }))
}

// ============ GET /api/doc ============

#[derive(Debug, Deserialize)]
struct DocQuery {
    id: Option<String>,
}

async fn handle_doc(
    State(state): State<AppState>,
    Query(query): Query<DocQuery>,
) -> Result<Json<DocumentResponse>, AppError> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| bad_request("id must not be empty"))?;

    match get_document(&state.store, &id).await.map_err(internal)? {
        Some(doc) => Ok(Json(doc)),
        None => Err(not_found(format!("document not found: {}", id))),
    }
}
