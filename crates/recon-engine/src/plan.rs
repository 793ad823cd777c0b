//! Delta plan computation (spec §4.4 steps 1-4).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use recon_core::Chunk;
use recon_store::VectorStoreAdapter;

use crate::fanout::fetch_by_item_ids;

/// Default bounded worker pool size for `get_by_item_id` fan-out (spec §5:
/// "default: small constant, e.g. 8 workers").
pub const DEFAULT_WORKER_POOL_SIZE: usize = 8;

/// The outcome of comparing an incoming batch against the store. `to_add`
/// holds positions into the caller's `chunks` slice rather than owned
/// chunks, so the caller can pair each addition with its matching vector
/// without a second pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaPlan {
    pub to_add: Vec<usize>,
    pub to_touch: Vec<String>,
    pub to_delete: Vec<String>,
}

pub async fn compute_delta_plan(
    store: &Arc<dyn VectorStoreAdapter>,
    chunks: &[Chunk],
    worker_pool_size: usize,
) -> DeltaPlan {
    if let Ok(Some(0)) = store.count().await {
        return DeltaPlan {
            to_add: (0..chunks.len()).collect(),
            to_touch: Vec::new(),
            to_delete: Vec::new(),
        };
    }

    let mut distinct_item_ids = Vec::new();
    let mut seen = HashSet::new();
    for chunk in chunks {
        let item_id = chunk.item_id().to_string();
        if seen.insert(item_id.clone()) {
            distinct_item_ids.push(item_id);
        }
    }

    let db_by_item = fetch_by_item_ids(store, distinct_item_ids, worker_pool_size).await;

    let mut to_add = Vec::new();
    let mut to_touch_raw = Vec::new();
    let mut to_delete_raw = Vec::new();

    for (idx, chunk) in chunks.iter().enumerate() {
        let records = db_by_item.get(chunk.item_id()).map(Vec::as_slice).unwrap_or(&[]);
        if records.is_empty() {
            to_add.push(idx);
            continue;
        }
        let checksum_matches = records.iter().any(|r| r.checksum == chunk.checksum());
        if checksum_matches {
            to_touch_raw.extend(records.iter().map(|r| r.chunk_id.clone()));
        } else {
            to_add.push(idx);
            to_delete_raw.extend(records.iter().map(|r| r.chunk_id.clone()));
        }
    }

    let to_delete = dedup_preserve_order(to_delete_raw);
    let delete_set: HashSet<&str> = to_delete.iter().map(String::as_str).collect();
    let to_touch = dedup_preserve_order(to_touch_raw)
        .into_iter()
        .filter(|id| !delete_set.contains(id.as_str()))
        .collect();

    DeltaPlan { to_add, to_touch, to_delete }
}

fn dedup_preserve_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
