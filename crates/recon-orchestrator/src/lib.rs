//! Orchestrator (spec §2 item 8): wires the Dataset Reader, Chunker,
//! Identity Stamper, Embedding Adapter, Vector Store Adapter, and
//! Reconciliation Engine into one configuration-driven run.

mod backend;
mod config;
mod embedding;
mod pipeline;
mod sink;

pub use backend::build_store;
pub use config::{BackendConfig, Config, DataUpdatesStrategy, EmbeddingsConfig, EmbeddingsProviderConfig};
pub use embedding::build_provider;
pub use pipeline::{run, PipelineError, RunReport};
pub use sink::{InMemorySink, OutputSink, ReconciledChunks};

/// Parse a TOML configuration file's contents (spec §6 "Ambient stack":
/// configuration loaded from TOML via the `toml` crate).
pub fn load_config(toml_source: &str) -> Result<Config, recon_core::ReconError> {
    toml::from_str(toml_source).map_err(|error| recon_core::ReconError::ConfigInvalid(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recon_core::{DatasetItem, MetadataMap};
    use recon_dataset::PagedDataset;
    use recon_embedding::FakeEmbeddingProvider;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct InMemoryDataset {
        items: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl PagedDataset for InMemoryDataset {
        async fn fetch_page(&self, _dataset_id: &str, offset: usize, limit: usize) -> anyhow::Result<Vec<DatasetItem>> {
            Ok(self.items.iter().skip(offset).take(limit).cloned().map(DatasetItem).collect())
        }
    }

    struct InMemoryStore {
        entries: Mutex<Vec<recon_core::StoredRecord>>,
    }

    #[async_trait]
    impl recon_store::VectorStoreAdapter for InMemoryStore {
        async fn add(
            &self,
            chunks: &[recon_core::Chunk],
            _vectors: &[recon_store::Embedding],
            ids: &[String],
        ) -> anyhow::Result<Vec<String>> {
            let mut entries = self.entries.lock().await;
            for (chunk, id) in chunks.iter().zip(ids) {
                let mut record = recon_core::StoredRecord::from_chunk(chunk, Some(id));
                record.chunk_id = id.clone();
                entries.retain(|r| &r.chunk_id != id);
                entries.push(record);
            }
            Ok(ids.to_vec())
        }
        async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
            self.entries.lock().await.retain(|r| !ids.contains(&r.chunk_id));
            Ok(())
        }
        async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
            self.entries.lock().await.retain(|r| r.item_id != item_id);
            Ok(())
        }
        async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<recon_core::StoredRecord>> {
            Ok(self.entries.lock().await.iter().filter(|r| r.item_id == item_id).cloned().collect())
        }
        async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
            let ts = ts.unwrap_or(0);
            let mut entries = self.entries.lock().await;
            for record in entries.iter_mut() {
                if ids.contains(&record.chunk_id) {
                    record.last_seen_at = ts;
                }
            }
            Ok(())
        }
        async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
            self.entries.lock().await.retain(|r| r.last_seen_at >= cutoff_ts);
            Ok(())
        }
        async fn search_by_vector(
            &self,
            _vector: &[f32],
            k: usize,
            _filter: Option<&MetadataMap>,
        ) -> anyhow::Result<Vec<recon_core::StoredRecord>> {
            Ok(self.entries.lock().await.iter().take(k).cloned().collect())
        }
        async fn count(&self) -> anyhow::Result<Option<u64>> {
            Ok(Some(self.entries.lock().await.len() as u64))
        }
        async fn delete_all(&self) -> anyhow::Result<()> {
            self.entries.lock().await.clear();
            Ok(())
        }
    }

    fn config() -> Config {
        load_config(
            r#"
            datasetId = "ds-1"
            datasetFields = ["title"]
            dataUpdatesPrimaryDatasetFields = ["url"]
            dataUpdatesStrategy = "add"
            embeddingsProvider = "fake"

            [metadataDatasetFields]
            url = "url"

            [embeddingsConfig]
            dimension = 4

            [vectorStore]
            backend = "qdrant"
            baseUrl = "http://localhost:6333"
            collection = "docs"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn given_a_minimal_run_when_reconciling_then_every_chunk_lands_in_the_store_and_sink() {
        let dataset = InMemoryDataset {
            items: vec![
                serde_json::json!({"title": "hello world", "url": "https://a.example.com"}),
                serde_json::json!({"title": "", "url": "https://b.example.com"}),
            ],
        };
        let embedder = FakeEmbeddingProvider::new(4);
        let store: Arc<dyn recon_store::VectorStoreAdapter> = Arc::new(InMemoryStore { entries: Mutex::new(Vec::new()) });
        let sink = InMemorySink::new();

        let report = run(&config(), &dataset, &embedder, store, &sink).await.unwrap();

        // The second item has an empty projected page_content and is filtered (§4.1).
        assert_eq!(report.documents_read, 1);
        assert_eq!(report.chunks_considered, 1);
        assert_eq!(report.outcome.added.len(), 1);

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].added.len(), 1);
    }

    #[tokio::test]
    async fn given_invalid_config_when_running_then_the_phase_is_reported_as_config() {
        let mut config = config();
        config.dataset_id = String::new();
        let dataset = InMemoryDataset { items: Vec::new() };
        let embedder = FakeEmbeddingProvider::new(4);
        let store: Arc<dyn recon_store::VectorStoreAdapter> = Arc::new(InMemoryStore { entries: Mutex::new(Vec::new()) });
        let sink = InMemorySink::new();

        let error = run(&config, &dataset, &embedder, store, &sink).await.unwrap_err();
        assert_eq!(error.phase, "config");
    }
}
