use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, StoredRecord, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use serde_json::json;

use crate::{batched, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// Chroma adapter (spec §4.5, §6), against the v1 HTTP API
/// (`/api/v1/collections/{id}/...`).
pub struct ChromaAdapter {
    client: reqwest::Client,
    base_url: String,
    collection_id: String,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl ChromaAdapter {
    pub fn new(base_url: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection_id: collection_id.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn collection_url(&self, path: &str) -> String {
        format!("{}/api/v1/collections/{}{}", self.base_url, self.collection_id, path)
    }
}

fn chunk_metadata_json(chunk: &Chunk) -> serde_json::Value {
    let mut metadata = serde_json::Map::new();
    for (key, value) in &chunk.metadata {
        metadata.insert(key.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
    }
    serde_json::Value::Object(metadata)
}

#[async_trait]
impl super::VectorStoreAdapter for ChromaAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, ids, self.batch_size) {
            with_retry("chroma", "add", TimeoutClass::ReadWrite, &self.backoff, || async {
                let documents: Vec<_> = chunk_batch.iter().map(|c| c.page_content.clone()).collect();
                let metadatas: Vec<_> = chunk_batch.iter().map(chunk_metadata_json).collect();
                let response = self
                    .client
                    .post(self.collection_url("/upsert"))
                    .json(&json!({
                        "ids": id_batch,
                        "documents": documents,
                        "metadatas": metadatas,
                        "embeddings": vector_batch,
                    }))
                    .send()
                    .await?;
                anyhow::ensure!(response.status().is_success(), "chroma upsert failed: {}", response.status());
                Ok(())
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        with_retry("chroma", "delete", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .client
                .post(self.collection_url("/delete"))
                .json(&json!({ "ids": ids }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "chroma delete failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        with_retry("chroma", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || async {
            let response = self
                .client
                .post(self.collection_url("/delete"))
                .json(&json!({ "where": { KEY_ITEM_ID: item_id } }))
                .send()
                .await?;
            anyhow::ensure!(
                response.status().is_success(),
                "chroma delete_by_item_id failed: {}",
                response.status()
            );
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("chroma", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .client
                .post(self.collection_url("/get"))
                .json(&json!({ "where": { KEY_ITEM_ID: item_id }, "include": ["metadatas", "documents"] }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "chroma get failed: {}", response.status());
            Ok(parse_get_response(&response.json().await?))
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("chroma", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            let metadatas: Vec<_> = ids.iter().map(|_| json!({ KEY_LAST_SEEN_AT: ts })).collect();
            let response = self
                .client
                .post(self.collection_url("/update"))
                .json(&json!({ "ids": ids, "metadatas": metadatas }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "chroma touch failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        with_retry("chroma", "delete_expired", TimeoutClass::Delete, &self.backoff, || async {
            let response = self
                .client
                .post(self.collection_url("/delete"))
                .json(&json!({ "where": { KEY_LAST_SEEN_AT: { "$lt": cutoff_ts } } }))
                .send()
                .await?;
            anyhow::ensure!(
                response.status().is_success(),
                "chroma delete_expired failed: {}",
                response.status()
            );
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
        let where_clause = filter.map(metadata_filter_to_where);
        with_retry("chroma", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || async {
            let mut body = json!({
                "query_embeddings": [vector],
                "n_results": k,
                "include": ["metadatas", "documents"],
            });
            if let Some(where_clause) = &where_clause {
                body["where"] = where_clause.clone();
            }
            let response = self.client.post(self.collection_url("/query")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "chroma query failed: {}", response.status());
            Ok(parse_query_response(&response.json().await?))
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        let count = with_retry("chroma", "count", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self.client.get(self.collection_url("/count")).send().await?;
            anyhow::ensure!(response.status().is_success(), "chroma count failed: {}", response.status());
            Ok(response.json::<u64>().await?)
        })
        .await
        .map_err(anyhow::Error::from)?;
        Ok(Some(count))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let response = self.client.post(self.collection_url("/delete")).json(&json!({})).send().await?;
        anyhow::ensure!(response.status().is_success(), "chroma delete_all failed: {}", response.status());
        Ok(())
    }
}

fn metadata_filter_to_where(filter: &MetadataMap) -> serde_json::Value {
    let clauses: Vec<_> = filter
        .iter()
        .map(|(key, value)| json!({ key: serde_json::to_value(value).unwrap_or(serde_json::Value::Null) }))
        .collect();
    if clauses.len() == 1 {
        clauses.into_iter().next().unwrap()
    } else {
        json!({ "$and": clauses })
    }
}

fn parse_get_response(body: &serde_json::Value) -> Vec<StoredRecord> {
    let ids = body["ids"].as_array().cloned().unwrap_or_default();
    let metadatas = body["metadatas"].as_array().cloned().unwrap_or_default();
    let documents = body["documents"].as_array().cloned().unwrap_or_default();
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let native_id = id.as_str().unwrap_or_default();
            let metadata = metadatas.get(i).cloned().unwrap_or(serde_json::Value::Null);
            let mut record = crate::stored_record_from_metadata(native_id, &metadata);
            record.text = documents.get(i).and_then(|d| d.as_str()).unwrap_or_default().to_string();
            record
        })
        .collect()
}

fn parse_query_response(body: &serde_json::Value) -> Vec<StoredRecord> {
    let ids = body["ids"][0].as_array().cloned().unwrap_or_default();
    let metadatas = body["metadatas"][0].as_array().cloned().unwrap_or_default();
    let documents = body["documents"][0].as_array().cloned().unwrap_or_default();
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let native_id = id.as_str().unwrap_or_default();
            let metadata = metadatas.get(i).cloned().unwrap_or(serde_json::Value::Null);
            let mut record = crate::stored_record_from_metadata(native_id, &metadata);
            record.text = documents.get(i).and_then(|d| d.as_str()).unwrap_or_default().to_string();
            record
        })
        .collect()
}
