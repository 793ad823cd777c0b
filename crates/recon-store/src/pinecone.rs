use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, StoredRecord, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use serde_json::json;

use crate::{batched, stored_id, strip_id_prefix, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// Pinecone adapter (spec §4.5, §6). The only backend that opts into id
/// prefixing (`usePineconeIdPrefix`): Pinecone has no metadata-filtered
/// delete/fetch, so `get_by_item_id`/`delete_by_item_id` fall back to a
/// dummy-vector similarity scan unless prefix listing is enabled, mirroring
/// the teacher's reference Python implementation.
pub struct PineconeAdapter {
    client: reqwest::Client,
    index_host: String,
    namespace: Option<String>,
    use_id_prefix: bool,
    dummy_vector: Vec<f32>,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl PineconeAdapter {
    pub fn new(index_host: impl Into<String>, namespace: Option<String>, dummy_vector: Vec<f32>) -> Self {
        Self {
            client: reqwest::Client::new(),
            index_host: index_host.into(),
            namespace,
            use_id_prefix: false,
            dummy_vector,
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_id_prefix(mut self, enabled: bool) -> Self {
        self.use_id_prefix = enabled;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.index_host, path)
    }

    fn with_namespace(&self, mut body: serde_json::Value) -> serde_json::Value {
        if let Some(namespace) = &self.namespace {
            body["namespace"] = json!(namespace);
        }
        body
    }

    async fn list_ids_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut body = json!({ "prefix": prefix });
        body = self.with_namespace(body);
        let response = self.client.get(self.url("/vectors/list")).query(&body).send().await?;
        anyhow::ensure!(response.status().is_success(), "pinecone list failed: {}", response.status());
        let parsed: serde_json::Value = response.json().await?;
        Ok(parsed["vectors"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v["id"].as_str().map(String::from))
            .collect())
    }

    async fn query_by_filter(&self, filter: serde_json::Value, top_k: usize) -> anyhow::Result<Vec<StoredRecord>> {
        let body = self.with_namespace(json!({
            "vector": self.dummy_vector,
            "topK": top_k,
            "filter": filter,
            "includeMetadata": true,
        }));
        let response = self.client.post(self.url("/query")).json(&body).send().await?;
        anyhow::ensure!(response.status().is_success(), "pinecone query failed: {}", response.status());
        let parsed: serde_json::Value = response.json().await?;
        Ok(parsed["matches"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|m| {
                let native_id = m["id"].as_str().unwrap_or_default();
                crate::stored_record_from_metadata(native_id, &m["metadata"])
            })
            .collect())
    }
}

fn chunk_metadata(chunk: &Chunk) -> serde_json::Value {
    let mut metadata = serde_json::Map::new();
    for (key, value) in &chunk.metadata {
        metadata.insert(key.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
    }
    serde_json::Value::Object(metadata)
}

#[async_trait]
impl super::VectorStoreAdapter for PineconeAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        let stored_ids: Vec<String> = chunks.iter().map(|c| stored_id(c, self.use_id_prefix)).collect();
        let _ = ids;

        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, &stored_ids, self.batch_size) {
            with_retry("pinecone", "add", TimeoutClass::ReadWrite, &self.backoff, || async {
                let records: Vec<_> = chunk_batch
                    .iter()
                    .zip(vector_batch)
                    .zip(id_batch)
                    .map(|((chunk, vector), id)| {
                        json!({
                            "id": id,
                            "values": vector,
                            "metadata": chunk_metadata(chunk),
                        })
                    })
                    .collect();
                let body = self.with_namespace(json!({ "vectors": records }));
                let response = self.client.post(self.url("/vectors/upsert")).json(&body).send().await?;
                anyhow::ensure!(response.status().is_success(), "pinecone upsert failed: {}", response.status());
                Ok(())
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(stored_ids)
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        with_retry("pinecone", "delete", TimeoutClass::ReadWrite, &self.backoff, || async {
            let body = self.with_namespace(json!({ "ids": ids }));
            let response = self.client.post(self.url("/vectors/delete")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "pinecone delete failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        with_retry("pinecone", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || async {
            let ids = if self.use_id_prefix {
                let prefix = if item_id.contains('#') { item_id.to_string() } else { format!("{item_id}#") };
                self.list_ids_by_prefix(&prefix).await?
            } else {
                self.query_by_filter(json!({ KEY_ITEM_ID: item_id }), 10_000)
                    .await?
                    .into_iter()
                    .map(|r| r.chunk_id)
                    .collect()
            };
            if ids.is_empty() {
                return Ok(());
            }
            let body = self.with_namespace(json!({ "ids": ids }));
            let response = self.client.post(self.url("/vectors/delete")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "pinecone delete_by_item_id failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("pinecone", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || async {
            if self.use_id_prefix {
                let prefix = if item_id.contains('#') { item_id.to_string() } else { format!("{item_id}#") };
                let ids = self.list_ids_by_prefix(&prefix).await?;
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let body = self.with_namespace(json!({ "ids": ids }));
                let response = self.client.get(self.url("/vectors/fetch")).query(&body).send().await?;
                anyhow::ensure!(response.status().is_success(), "pinecone fetch failed: {}", response.status());
                let parsed: serde_json::Value = response.json().await?;
                let vectors = parsed["vectors"].as_object().cloned().unwrap_or_default();
                Ok(vectors
                    .iter()
                    .map(|(native_id, v)| {
                        let mut record = crate::stored_record_from_metadata(native_id, &v["metadata"]);
                        record.chunk_id = strip_id_prefix(native_id).to_string();
                        record
                    })
                    .collect())
            } else {
                self.query_by_filter(json!({ KEY_ITEM_ID: item_id }), 10_000).await
            }
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("pinecone", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            for id in ids {
                let body = self.with_namespace(json!({ "id": id, "setMetadata": { KEY_LAST_SEEN_AT: ts } }));
                let response = self.client.post(self.url("/vectors/update")).json(&body).send().await?;
                anyhow::ensure!(response.status().is_success(), "pinecone touch failed: {}", response.status());
            }
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        with_retry("pinecone", "delete_expired", TimeoutClass::Delete, &self.backoff, || async {
            let matches = self
                .query_by_filter(json!({ KEY_LAST_SEEN_AT: { "$lt": cutoff_ts } }), 10_000)
                .await?;
            let ids: Vec<String> = matches.into_iter().map(|r| r.chunk_id).filter(|id| !id.is_empty()).collect();
            if ids.is_empty() {
                return Ok(());
            }
            let body = self.with_namespace(json!({ "ids": ids }));
            let response = self.client.post(self.url("/vectors/delete")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "pinecone delete_expired failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataMap>,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let filter_json = filter
            .map(|f| {
                let entries: serde_json::Map<_, _> = f
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(serde_json::Value::Null)))
                    .collect();
                serde_json::Value::Object(entries)
            })
            .unwrap_or(serde_json::Value::Null);
        with_retry("pinecone", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || async {
            let body = self.with_namespace(json!({ "vector": vector, "topK": k, "filter": filter_json, "includeMetadata": true }));
            let response = self.client.post(self.url("/query")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "pinecone search failed: {}", response.status());
            let parsed: serde_json::Value = response.json().await?;
            Ok(parsed["matches"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .iter()
                .map(|m| {
                    let native_id = m["id"].as_str().unwrap_or_default();
                    crate::stored_record_from_metadata(native_id, &m["metadata"])
                })
                .collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        let count = with_retry("pinecone", "count", TimeoutClass::ReadWrite, &self.backoff, || async {
            let body = self.with_namespace(json!({}));
            let response = self.client.post(self.url("/describe_index_stats")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "pinecone describe_index_stats failed: {}", response.status());
            let parsed: serde_json::Value = response.json().await?;
            Ok(parsed["totalVectorCount"].as_u64().unwrap_or(0))
        })
        .await
        .map_err(anyhow::Error::from)?;
        Ok(Some(count))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let ids = self.list_ids_by_prefix("").await?;
        if ids.is_empty() {
            return Ok(());
        }
        let body = self.with_namespace(json!({ "ids": ids }));
        let response = self.client.post(self.url("/vectors/delete")).json(&body).send().await?;
        anyhow::ensure!(response.status().is_success(), "pinecone delete_all failed: {}", response.status());
        Ok(())
    }

    fn supports_id_prefix(&self) -> bool {
        self.use_id_prefix
    }
}
