//! Bounded parallel fan-out for `get_by_item_id` (spec §4.4 step 2, §5): a
//! semaphore gates a `JoinSet` so at most `worker_pool_size` reads are in
//! flight at once. Per-item failures are logged and the item is treated as
//! having no prior records rather than aborting the run.

use std::collections::HashMap;
use std::sync::Arc;

use recon_core::StoredRecord;
use recon_store::VectorStoreAdapter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub async fn fetch_by_item_ids(
    store: &Arc<dyn VectorStoreAdapter>,
    item_ids: Vec<String>,
    worker_pool_size: usize,
) -> HashMap<String, Vec<StoredRecord>> {
    let semaphore = Arc::new(Semaphore::new(worker_pool_size.max(1)));
    let mut join_set = JoinSet::new();

    for item_id in item_ids {
        let store = Arc::clone(store);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("fan-out semaphore never closes");
            let result = store.get_by_item_id(&item_id).await;
            (item_id, result)
        });
    }

    let mut db_by_item = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((item_id, Ok(records))) => {
                db_by_item.insert(item_id, records);
            }
            Ok((item_id, Err(error))) => {
                tracing::warn!(item_id = %item_id, error = %error, "get_by_item_id failed, treating item as new");
            }
            Err(join_error) => {
                tracing::warn!(error = %join_error, "get_by_item_id task panicked");
            }
        }
    }
    db_by_item
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recon_core::{Chunk, MetadataMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        fail_for: Vec<String>,
    }

    #[async_trait]
    impl VectorStoreAdapter for CountingStore {
        async fn add(&self, _: &[Chunk], _: &[recon_store::Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
            Ok(ids.to_vec())
        }
        async fn delete(&self, _: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_by_item_id(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_for.iter().any(|id| id == item_id) {
                anyhow::bail!("simulated failure for {item_id}");
            }
            Ok(vec![StoredRecord {
                chunk_id: format!("{item_id}-chunk"),
                item_id: item_id.to_string(),
                checksum: "c".to_string(),
                last_seen_at: 0,
                text: String::new(),
                metadata: MetadataMap::new(),
            }])
        }
        async fn touch(&self, _: &[String], _: Option<i64>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_expired(&self, _: i64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn search_by_vector(
            &self,
            _: &[f32],
            _: usize,
            _: Option<&MetadataMap>,
        ) -> anyhow::Result<Vec<StoredRecord>> {
            Ok(Vec::new())
        }
        async fn delete_all(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn given_more_items_than_workers_when_fanning_out_then_concurrency_stays_bounded() {
        let store: Arc<dyn VectorStoreAdapter> = Arc::new(CountingStore {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            fail_for: Vec::new(),
        });
        let item_ids: Vec<String> = (0..20).map(|i| format!("item-{i}")).collect();
        let result = fetch_by_item_ids(&store, item_ids, 4).await;
        assert_eq!(result.len(), 20);
    }

    #[tokio::test]
    async fn given_a_failing_item_when_fanning_out_then_it_is_dropped_not_aborted() {
        let store: Arc<dyn VectorStoreAdapter> = Arc::new(CountingStore {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            fail_for: vec!["bad".to_string()],
        });
        let item_ids = vec!["bad".to_string(), "good".to_string()];
        let result = fetch_by_item_ids(&store, item_ids, 8).await;
        assert!(!result.contains_key("bad"));
        assert!(result.contains_key("good"));
    }
}
