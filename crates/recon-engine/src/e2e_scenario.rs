//! The literal end-to-end reconciliation scenario (spec §8), run against the
//! in-memory fixture: a store seeded with six prior records, reconciled
//! against an incoming batch that leaves one item unchanged, one item's
//! checksum changed, and one item's whole chunk set replaced.

use std::sync::Arc;

use recon_core::{Document, MetadataMap, MetadataValue};
use recon_store::VectorStoreAdapter;

use crate::reconcile::{expire, reconcile};
use crate::test_support::InMemoryStore;
use crate::Strategy;

fn chunk(item_id: &str, chunk_id: &str, checksum: &str, last_seen_at: i64) -> recon_core::Chunk {
    let mut metadata = MetadataMap::new();
    metadata.insert("item_id".into(), MetadataValue::String(item_id.into()));
    metadata.insert("chunk_id".into(), MetadataValue::String(chunk_id.into()));
    metadata.insert("checksum".into(), MetadataValue::String(checksum.into()));
    metadata.insert("last_seen_at".into(), MetadataValue::Int(last_seen_at));
    Document::new(format!("{item_id}/{chunk_id}"), metadata)
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.seed_with_last_seen_at(chunk("id1", "UUID10", "1", 0), vec![0.0; 2], 0);
    store.seed_with_last_seen_at(chunk("id2", "UUID20", "2", 1), vec![0.0; 2], 1);
    store.seed_with_last_seen_at(chunk("id3", "UUID30", "3", 1), vec![0.0; 2], 1);
    store.seed_with_last_seen_at(chunk("id4", "UUID4a", "4", 1), vec![0.0; 2], 1);
    store.seed_with_last_seen_at(chunk("id4", "UUID4b", "4", 1), vec![0.0; 2], 1);
    store.seed_with_last_seen_at(chunk("id5", "UUID5a", "5", 1), vec![0.0; 2], 1);
    store
}

fn as_adapter(store: &Arc<InMemoryStore>) -> Arc<dyn VectorStoreAdapter> {
    Arc::clone(store) as Arc<dyn VectorStoreAdapter>
}

fn incoming_batch() -> Vec<recon_core::Chunk> {
    vec![
        chunk("id3", "UUID30", "3", 2),
        chunk("id4", "UUID4c", "4c", 2),
        chunk("id5", "UUID5b", "5bc", 2),
        chunk("id5", "UUID5c", "5bc", 2),
        chunk("id5", "UUID60", "6", 2),
    ]
}

fn vectors_for(chunks: &[recon_core::Chunk]) -> Vec<Vec<f32>> {
    chunks.iter().map(|_| vec![0.0; 2]).collect()
}

#[tokio::test]
async fn given_the_published_scenario_when_reconciling_then_the_plan_and_store_match_exactly() {
    let fixture = seeded_store();
    let store = as_adapter(&fixture);
    let chunks = incoming_batch();
    let vectors = vectors_for(&chunks);

    let plan = crate::compute_delta_plan(&store, &chunks, crate::DEFAULT_WORKER_POOL_SIZE).await;
    let added_ids: Vec<&str> = plan.to_add.iter().map(|&i| chunks[i].chunk_id().unwrap()).collect();
    assert_eq!(added_ids, vec!["UUID4c", "UUID5b", "UUID5c", "UUID60"]);
    assert_eq!(plan.to_touch, vec!["UUID30".to_string()]);
    let mut deleted = plan.to_delete.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["UUID4a".to_string(), "UUID4b".to_string(), "UUID5a".to_string()]);

    let outcome = reconcile(&store, &chunks, &vectors, Strategy::Delta).await.unwrap();
    assert_eq!(outcome.touched, vec!["UUID30".to_string()]);

    assert_eq!(fixture.len(), 7);
    for id in ["UUID10", "UUID20", "UUID30", "UUID4c", "UUID5b", "UUID5c", "UUID60"] {
        assert!(fixture.get(id).is_some(), "expected {id} to be present after reconcile");
    }
    for id in ["UUID4a", "UUID4b", "UUID5a"] {
        assert!(fixture.get(id).is_none(), "expected {id} to be deleted");
    }
    assert_eq!(fixture.get("UUID30").unwrap().last_seen_at, 2);

    expire(&store, 1).await.unwrap();
    assert_eq!(fixture.len(), 6);
    assert!(fixture.get("UUID10").is_none());

    let second_plan = crate::compute_delta_plan(&store, &chunks, crate::DEFAULT_WORKER_POOL_SIZE).await;
    assert!(second_plan.to_add.is_empty());
    assert!(second_plan.to_delete.is_empty());
    let mut touched = second_plan.to_touch.clone();
    touched.sort();
    let mut expected_touch = vec!["UUID30", "UUID4c", "UUID5b", "UUID5c", "UUID60"];
    expected_touch.sort();
    assert_eq!(touched, expected_touch);
}

#[tokio::test]
async fn given_upsert_strategy_with_a_single_changed_chunk_then_only_that_item_is_replaced() {
    let fixture = seeded_store();
    let store = as_adapter(&fixture);
    let chunks = vec![chunk("id4", "UUID4c", "4c", 2)];
    let vectors = vectors_for(&chunks);

    let outcome = reconcile(&store, &chunks, &vectors, Strategy::Upsert).await.unwrap();
    assert_eq!(outcome.added, vec!["UUID4c".to_string()]);

    assert!(fixture.get("UUID4a").is_none());
    assert!(fixture.get("UUID4b").is_none());
    assert!(fixture.get("UUID4c").is_some());
    assert_eq!(fixture.get("UUID30").unwrap().last_seen_at, 1);
    assert_eq!(fixture.get("UUID5a").unwrap().last_seen_at, 1);
}

#[tokio::test]
async fn given_append_strategy_then_every_chunk_is_added_without_diffing() {
    let fixture = seeded_store();
    let store = as_adapter(&fixture);
    let chunks = incoming_batch();
    let vectors = vectors_for(&chunks);

    reconcile(&store, &chunks, &vectors, Strategy::Append).await.unwrap();

    // Append never deletes, so both the stale id4/id5 records and their
    // freshly-added replacements coexist.
    for id in ["UUID10", "UUID20", "UUID4a", "UUID4b", "UUID5a", "UUID4c", "UUID5b", "UUID5c", "UUID60"] {
        assert!(fixture.get(id).is_some(), "expected {id} to be present after append");
    }
    assert_eq!(fixture.len(), 10);
}
