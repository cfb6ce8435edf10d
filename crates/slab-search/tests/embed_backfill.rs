mod common;

use common::{document, temp_db, ts, KeywordEmbedder};

use slab_search::embed_cmd::{backfill, BackfillOptions};
use slab_search::sqlite_store::SqliteStore;
use slab_search_core::embedding::{blob_to_vec, vec_to_blob};
use slab_search_core::models::EmbeddingSlot;
use slab_search_core::store::DocumentStore;

async fn seeded_store() -> (tempfile::TempDir, SqliteStore) {
    let (tmp, pool) = temp_db().await;
    let store = SqliteStore::new(pool);
    store.upsert(&document("a", "Deploy", "deploy steps", 1_000)).await.unwrap();
    store.upsert(&document("b", "Lunch", "tacos", 2_000)).await.unwrap();
    store.upsert(&document("c", "Oncall", "pager", 3_000)).await.unwrap();
    store.upsert(&document("z", "Retired", "old", 500)).await.unwrap();
    store.mark_archived("z", ts(600)).await.unwrap();
    (tmp, store)
}

#[tokio::test]
async fn test_backfill_embeds_active_documents() {
    let (_tmp, store) = seeded_store().await;
    let embedder = KeywordEmbedder::new();

    let stats = backfill(&store, &embedder, &BackfillOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.considered, 3);
    assert_eq!(stats.embedded, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(embedder.calls(), 3);

    let a = store.get_by_key("a").await.unwrap().unwrap();
    assert_eq!(a.embedding.as_deref().and_then(blob_to_vec), Some(vec![1.0, 0.0, 0.0]));
    assert!(a.embedding_alt.is_none());
    assert!(store.get_by_key("z").await.unwrap().unwrap().embedding.is_none());
}

#[tokio::test]
async fn test_backfill_missing_only_and_alternate_slot() {
    let (_tmp, store) = seeded_store().await;
    store
        .set_embedding("b", EmbeddingSlot::Alternate, &vec_to_blob(&[9.0]))
        .await
        .unwrap();
    let embedder = KeywordEmbedder::new();

    let options = BackfillOptions {
        slot: EmbeddingSlot::Alternate,
        missing_only: true,
        ..Default::default()
    };
    let stats = backfill(&store, &embedder, &options).await.unwrap();
    assert_eq!(stats.embedded, 2);
    assert_eq!(stats.skipped, 1);

    let b = store.get_by_key("b").await.unwrap().unwrap();
    assert_eq!(b.embedding_alt.as_deref().and_then(blob_to_vec), Some(vec![9.0]));
    assert!(b.embedding.is_none());
    assert_eq!(store.count_embedded(EmbeddingSlot::Alternate).await.unwrap(), 3);
    assert_eq!(store.count_embedded(EmbeddingSlot::Primary).await.unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_resumes_from_key() {
    let (_tmp, store) = seeded_store().await;
    let embedder = KeywordEmbedder::new();

    let options = BackfillOptions {
        start_from: Some("b".to_string()),
        ..Default::default()
    };
    let stats = backfill(&store, &embedder, &options).await.unwrap();
    assert_eq!(stats.considered, 2);
    assert!(store.get_by_key("a").await.unwrap().unwrap().embedding.is_none());
    assert!(store.get_by_key("c").await.unwrap().unwrap().embedding.is_some());

    let options = BackfillOptions {
        start_from: Some("nope".to_string()),
        ..Default::default()
    };
    let err = backfill(&store, &embedder, &options).await.unwrap_err();
    assert!(err.to_string().contains("start-from key not found"));
}
