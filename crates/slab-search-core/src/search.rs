//! Retrieval engine with keyword, vector, and hybrid modes.
//!
//! The engine reads only through the [`DocumentStore`] and [`LexicalIndex`]
//! seams. The caller embeds the query (if it can) and passes the vector in.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Validate the lexical weight `w ∈ [0, 1]` before any I/O.
//! 2. Fetch `3 × limit` keyword candidates and `3 × limit` vector
//!    candidates concurrently.
//! 3. Normalize each candidate set to `[0, 1]` with min-max normalization.
//! 4. Merge by key: `score = w × keyword + (1 - w) × vector`, where a
//!    document missing from one set contributes nothing from that side.
//! 5. Sort by fused score (desc), then by the heavier-weighted side's
//!    normalized score and rank, then the lighter side's.
//! 6. Truncate to `limit`.
//!
//! Over-fetching lets a document that ranks moderately in one mode but
//! highly in the other survive the cut.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::models::{EmbeddingSlot, SearchResult};
use crate::store::{DocumentStore, LexicalHit, LexicalIndex};

/// Candidate over-fetch factor for hybrid fusion.
pub const HYBRID_CANDIDATE_FACTOR: usize = 3;

/// Errors surfaced synchronously by the retrieval engine.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("lexical weight must be within [0, 1], got {0}")]
    InvalidWeight(f64),
    #[error("query text must not be empty")]
    EmptyQuery,
    #[error("a query embedding is required for semantic and hybrid search, but none could be produced")]
    MissingQueryVector,
    #[error("failed to generate query embedding: {0:#}")]
    QueryEmbedding(anyhow::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl SearchError {
    /// True for caller mistakes (bad weight, empty query) as opposed to
    /// backend or capability failures.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SearchError::InvalidWeight(_) | SearchError::EmptyQuery)
    }
}

/// Retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    Keyword,
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }

    /// Whether this mode needs a query embedding.
    pub fn needs_query_vector(&self) -> bool {
        !matches!(self, SearchMode::Keyword)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" | "lexical" => Ok(SearchMode::Keyword),
            "semantic" | "vector" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => anyhow::bail!(
                "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
                other
            ),
        }
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Pre-computed query embedding (required for semantic/hybrid modes).
    pub query_vec: Option<&'a [f32]>,
    pub mode: SearchMode,
    /// Which stored embedding to compare against.
    pub slot: EmbeddingSlot,
    pub limit: usize,
    /// Fraction of the hybrid score attributed to the keyword side.
    pub lexical_weight: f64,
}

/// Keyword, vector, and hybrid retrieval over a store and a lexical index.
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn LexicalIndex>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn DocumentStore>, index: Arc<dyn LexicalIndex>) -> Self {
        Self { store, index }
    }

    /// Dispatch on `req.mode`.
    pub async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<SearchResult>, SearchError> {
        match req.mode {
            SearchMode::Keyword => self.lexical(req.query, req.limit).await,
            SearchMode::Semantic => {
                if req.query.trim().is_empty() {
                    return Err(SearchError::EmptyQuery);
                }
                let qv = req.query_vec.ok_or(SearchError::MissingQueryVector)?;
                self.vector(qv, req.slot, req.limit).await
            }
            SearchMode::Hybrid => {
                self.hybrid(
                    req.query,
                    req.query_vec,
                    req.slot,
                    req.limit,
                    req.lexical_weight,
                )
                .await
            }
        }
    }

    /// Keyword search. Hits come back in the index's order with the index's
    /// score scale.
    pub async fn lexical(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let hits = self.index.query(query, limit).await?;
        Ok(hits.into_iter().map(lexical_result).collect())
    }

    /// Brute-force cosine scan over every non-archived document with a
    /// usable vector in `slot`.
    pub async fn vector(
        &self,
        query_vec: &[f32],
        slot: EmbeddingSlot,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let docs = self.store.list_non_archived().await?;

        let mut results: Vec<SearchResult> = docs
            .into_iter()
            .filter_map(|doc| {
                let vec = doc.embedding_bytes(slot).and_then(blob_to_vec)?;
                let score = cosine_similarity(query_vec, &vec) as f64;
                Some(SearchResult {
                    key: doc.key,
                    title: doc.title,
                    author: doc.author_name,
                    source_url: doc.source_url,
                    score,
                    fragments: None,
                })
            })
            .collect();

        // Stable sort: equal similarities keep scan order.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(results)
    }

    /// Fused keyword and vector search.
    ///
    /// Fails with [`SearchError::MissingQueryVector`] instead of degrading to
    /// keyword-only, so the weight always means what the caller asked for.
    pub async fn hybrid(
        &self,
        query: &str,
        query_vec: Option<&[f32]>,
        slot: EmbeddingSlot,
        limit: usize,
        lexical_weight: f64,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if !(0.0..=1.0).contains(&lexical_weight) {
            return Err(SearchError::InvalidWeight(lexical_weight));
        }
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let query_vec = query_vec.ok_or(SearchError::MissingQueryVector)?;

        let candidates = limit.saturating_mul(HYBRID_CANDIDATE_FACTOR);
        let (keyword, vector) = tokio::try_join!(
            self.lexical(query, candidates),
            self.vector(query_vec, slot, candidates),
        )?;

        let mut fused = fuse(keyword, vector, lexical_weight);
        fused.truncate(limit);
        Ok(fused)
    }
}

fn lexical_result(hit: LexicalHit) -> SearchResult {
    let fragments = if hit.fragments.is_empty() {
        None
    } else {
        Some(hit.fragments)
    };
    SearchResult {
        key: hit.key,
        title: hit.title,
        author: hit.author,
        source_url: hit.source_url,
        score: hit.score,
        fragments,
    }
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let s_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|&s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

struct Fused {
    result: SearchResult,
    keyword: Option<(f64, usize)>,
    vector: Option<(f64, usize)>,
}

/// Higher normalized score first, then better (lower) rank; absent last.
fn cmp_side(a: Option<(f64, usize)>, b: Option<(f64, usize)>) -> Ordering {
    match (a, b) {
        (Some((sa, ra)), Some((sb, rb))) => sb.total_cmp(&sa).then(ra.cmp(&rb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merge two ranked candidate lists into one fused ordering.
///
/// Both inputs must already be sorted by their own score descending.
pub fn fuse(
    keyword: Vec<SearchResult>,
    vector: Vec<SearchResult>,
    lexical_weight: f64,
) -> Vec<SearchResult> {
    let semantic_weight = 1.0 - lexical_weight;
    let kw_norm = normalize_scores(&keyword.iter().map(|r| r.score).collect::<Vec<_>>());
    let vec_norm = normalize_scores(&vector.iter().map(|r| r.score).collect::<Vec<_>>());

    let mut merged: Vec<Fused> = Vec::with_capacity(keyword.len() + vector.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (rank, (result, norm)) in keyword.into_iter().zip(kw_norm).enumerate() {
        by_key.insert(result.key.clone(), merged.len());
        merged.push(Fused {
            result,
            keyword: Some((norm, rank)),
            vector: None,
        });
    }
    for (rank, (result, norm)) in vector.into_iter().zip(vec_norm).enumerate() {
        match by_key.get(&result.key) {
            Some(&i) => merged[i].vector = Some((norm, rank)),
            None => {
                by_key.insert(result.key.clone(), merged.len());
                merged.push(Fused {
                    result,
                    keyword: None,
                    vector: Some((norm, rank)),
                });
            }
        }
    }

    for f in &mut merged {
        let k = f.keyword.map(|(s, _)| s * lexical_weight).unwrap_or(0.0);
        let v = f.vector.map(|(s, _)| s * semantic_weight).unwrap_or(0.0);
        f.result.score = k + v;
    }

    let keyword_heavier = lexical_weight >= semantic_weight;
    merged.sort_by(|a, b| {
        let by_score = b.result.score.total_cmp(&a.result.score);
        let kw = || cmp_side(a.keyword, b.keyword);
        let vec = || cmp_side(a.vector, b.vector);
        if keyword_heavier {
            by_score.then_with(kw).then_with(vec)
        } else {
            by_score.then_with(vec).then_with(kw)
        }
    });

    merged.into_iter().map(|f| f.result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vec_to_blob;
    use crate::models::Document;
    use crate::store::memory::InMemoryStore;
    use crate::store::IndexedDocument;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Lexical index that returns a fixed, pre-sorted hit list.
    struct FixedIndex {
        hits: Vec<LexicalHit>,
        queries: AtomicUsize,
    }

    impl FixedIndex {
        fn new(hits: &[(&str, f64)]) -> Self {
            Self {
                hits: hits
                    .iter()
                    .map(|(key, score)| LexicalHit {
                        key: key.to_string(),
                        score: *score,
                        title: key.to_uppercase(),
                        author: None,
                        source_url: format!("https://example.test/posts/{}", key),
                        fragments: Default::default(),
                    })
                    .collect(),
                queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LexicalIndex for FixedIndex {
        async fn index_or_replace(&self, _doc: &IndexedDocument) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn query(&self, _text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
            self.queries.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
        async fn document_count(&self) -> Result<u64> {
            Ok(self.hits.len() as u64)
        }
    }

    fn doc(key: &str, embedding: Option<&[f32]>) -> Document {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Document {
            key: key.to_string(),
            title: key.to_uppercase(),
            body: String::new(),
            content_hash: String::new(),
            author_name: None,
            author_email: None,
            topics: Vec::new(),
            source_url: format!("https://example.test/posts/{}", key),
            published_at: None,
            updated_at: ts,
            archived_at: None,
            synced_at: ts,
            embedding: embedding.map(vec_to_blob),
            embedding_alt: None,
        }
    }

    async fn engine(
        docs: Vec<Document>,
        hits: &[(&str, f64)],
    ) -> (SearchEngine, Arc<FixedIndex>) {
        let store = Arc::new(InMemoryStore::new());
        for d in &docs {
            store.upsert(d).await.unwrap();
        }
        let index = Arc::new(FixedIndex::new(hits));
        (SearchEngine::new(store, index.clone()), index)
    }

    fn keys(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.key.as_str()).collect()
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_range() {
        let result = normalize_scores(&[10.0, 5.0, 0.0]);
        assert!((result[0] - 1.0).abs() < 1e-9);
        assert!((result[1] - 0.5).abs() < 1e-9);
        assert!((result[2] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        for score in normalize_scores(&[3.0, 3.0]) {
            assert!((score - 1.0).abs() < 1e-9);
        }
        assert_eq!(normalize_scores(&[-7.5]), vec![1.0]);
    }

    #[tokio::test]
    async fn test_two_document_scenario() {
        // D1: keyword 10, cosine 0.9. D2: keyword 8, no embedding.
        let d1_vec = [0.9f32, (1.0f32 - 0.81).sqrt()];
        let (engine, _) = engine(
            vec![doc("d1", Some(&d1_vec)), doc("d2", None)],
            &[("d1", 10.0), ("d2", 8.0)],
        )
        .await;

        let results = engine
            .hybrid("deploy", Some(&[1.0, 0.0]), EmbeddingSlot::Primary, 10, 0.5)
            .await
            .unwrap();

        assert_eq!(keys(&results), vec!["d1", "d2"]);
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert!(results[1].score.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_weight_rejected_before_io() {
        let (engine, index) = engine(vec![], &[("a", 1.0)]).await;
        for w in [-0.1, 1.1, f64::NAN] {
            let err = engine
                .hybrid("q", Some(&[1.0]), EmbeddingSlot::Primary, 5, w)
                .await
                .unwrap_err();
            assert!(matches!(err, SearchError::InvalidWeight(_)));
            assert!(err.is_invalid_argument());
        }
        assert_eq!(index.queries.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hybrid_requires_query_vector() {
        let (engine, index) = engine(vec![], &[("a", 1.0)]).await;
        let err = engine
            .hybrid("q", None, EmbeddingSlot::Primary, 5, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::MissingQueryVector));
        assert!(!err.is_invalid_argument());
        assert_eq!(index.queries.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (engine, _) = engine(vec![], &[]).await;
        assert!(matches!(
            engine.lexical("   ", 5).await,
            Err(SearchError::EmptyQuery)
        ));
        assert!(matches!(
            engine
                .hybrid("", Some(&[1.0]), EmbeddingSlot::Primary, 5, 0.5)
                .await,
            Err(SearchError::EmptyQuery)
        ));
        let req = SearchRequest {
            query: " ",
            query_vec: Some(&[1.0]),
            mode: SearchMode::Semantic,
            slot: EmbeddingSlot::Primary,
            limit: 5,
            lexical_weight: 0.7,
        };
        assert!(matches!(
            engine.search(&req).await,
            Err(SearchError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_non_finite_vectors_rank_last() {
        let (engine, _) = engine(
            vec![
                doc("inf", Some(&[f32::INFINITY, 1.0])),
                doc("near", Some(&[1.0, 0.1])),
                doc("nan", Some(&[f32::NAN, 0.0])),
                doc("far", Some(&[-1.0, 0.0])),
            ],
            &[],
        )
        .await;

        let results = engine
            .vector(&[1.0, 0.0], EmbeddingSlot::Primary, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].key, "near");
        assert_eq!(results[3].key, "far");
        for r in &results {
            assert!((-1.0..=1.0).contains(&r.score), "{}: {}", r.key, r.score);
        }
    }

    #[tokio::test]
    async fn test_vector_skips_absent_malformed_and_archived() {
        let mut malformed = doc("bad", None);
        malformed.embedding = Some(vec![1, 2, 3]);
        let mut archived = doc("gone", Some(&[1.0, 0.0]));
        archived.archived_at = Some(Utc::now());
        let (engine, _) = engine(
            vec![
                doc("near", Some(&[1.0, 0.1])),
                doc("far", Some(&[0.0, 1.0])),
                doc("none", None),
                malformed,
                archived,
            ],
            &[],
        )
        .await;

        let results = engine
            .vector(&[1.0, 0.0], EmbeddingSlot::Primary, 10)
            .await
            .unwrap();
        assert_eq!(keys(&results), vec!["near", "far"]);

        let alt = engine
            .vector(&[1.0, 0.0], EmbeddingSlot::Alternate, 10)
            .await
            .unwrap();
        assert!(alt.is_empty());
    }

    #[tokio::test]
    async fn test_weight_extremes_match_single_modes() {
        let docs = vec![
            doc("a", Some(&[0.2, 1.0])),
            doc("b", Some(&[1.0, 0.0])),
            doc("c", Some(&[1.0, 1.0])),
            doc("d", Some(&[0.0, 1.0])),
        ];
        let hits = [("d", 9.0), ("a", 7.0), ("e", 3.0), ("b", 1.0)];
        let (engine, _) = engine(docs, &hits).await;
        let q = [1.0f32, 0.0];

        let vector_only = engine.vector(&q, EmbeddingSlot::Primary, 3).await.unwrap();
        let w0 = engine
            .hybrid("q", Some(&q), EmbeddingSlot::Primary, 3, 0.0)
            .await
            .unwrap();
        assert_eq!(keys(&w0), keys(&vector_only));

        let keyword_only = engine.lexical("q", 3).await.unwrap();
        let w1 = engine
            .hybrid("q", Some(&q), EmbeddingSlot::Primary, 3, 1.0)
            .await
            .unwrap();
        assert_eq!(keys(&w1), keys(&keyword_only));
    }

    #[test]
    fn test_fusion_rewards_agreement() {
        let result = |key: &str, score: f64| SearchResult {
            key: key.to_string(),
            title: String::new(),
            author: None,
            source_url: String::new(),
            score,
            fragments: None,
        };
        for w in [0.0, 0.3, 0.5, 0.7, 1.0] {
            let keyword = vec![result("both", 4.0), result("kw", 4.0), result("low", 1.0)];
            let vector = vec![result("both", 0.8), result("other", 0.2)];
            let fused = fuse(keyword, vector, w);
            let score = |k: &str| fused.iter().find(|r| r.key == k).unwrap().score;
            assert!(score("both") >= score("kw"), "w={}", w);
            assert!(score("both") >= score("other"), "w={}", w);
            for r in &fused {
                assert!((0.0..=1.0 + 1e-9).contains(&r.score));
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_mode() {
        let (engine, _) = engine(vec![doc("a", Some(&[1.0]))], &[("a", 2.0)]).await;
        let mut req = SearchRequest {
            query: "a",
            query_vec: None,
            mode: SearchMode::Keyword,
            slot: EmbeddingSlot::Primary,
            limit: 5,
            lexical_weight: 0.7,
        };
        assert_eq!(engine.search(&req).await.unwrap()[0].score, 2.0);

        req.mode = SearchMode::Semantic;
        assert!(matches!(
            engine.search(&req).await,
            Err(SearchError::MissingQueryVector)
        ));

        req.query_vec = Some(&[1.0]);
        let results = engine.search(&req).await.unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_query_embedding_error_keeps_cause() {
        let err = SearchError::QueryEmbedding(
            anyhow::anyhow!("connection refused").context("Ollama embed request failed"),
        );
        assert_eq!(
            err.to_string(),
            "failed to generate query embedding: Ollama embed request failed: connection refused"
        );
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("keyword".parse::<SearchMode>().unwrap(), SearchMode::Keyword);
        assert_eq!("vector".parse::<SearchMode>().unwrap(), SearchMode::Semantic);
        assert_eq!("hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }
}
