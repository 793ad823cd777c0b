use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, StoredRecord, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use serde_json::json;

use crate::{batched, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// Qdrant adapter (spec §4.5, §6). Points are addressed by `chunk_id`;
/// `item_id`/`checksum`/`last_seen_at` travel in the point payload.
/// Grounded on the filter/payload shapes the teacher's reference Python
/// implementation issues against `QdrantClient`.
pub struct QdrantAdapter {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl QdrantAdapter {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
            api_key,
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/collections/{}{}", self.base_url, self.collection, path);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    async fn upsert_batch(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<()> {
        let points: Vec<_> = chunks
            .iter()
            .zip(vectors)
            .zip(ids)
            .map(|((chunk, vector), id)| {
                json!({
                    "id": id,
                    "vector": vector,
                    "payload": metadata_payload(chunk),
                })
            })
            .collect();

        let response = self
            .request(reqwest::Method::PUT, "/points")
            .json(&json!({ "points": points }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "qdrant upsert failed: {}", response.status());
        Ok(())
    }
}

fn metadata_payload(chunk: &Chunk) -> serde_json::Value {
    let mut payload = serde_json::Map::new();
    for (key, value) in &chunk.metadata {
        payload.insert(key.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
    }
    payload.insert("text".to_string(), serde_json::Value::String(chunk.page_content.clone()));
    serde_json::Value::Object(payload)
}

#[async_trait]
impl super::VectorStoreAdapter for QdrantAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, ids, self.batch_size) {
            with_retry("qdrant", "add", TimeoutClass::ReadWrite, &self.backoff, || {
                self.upsert_batch(chunk_batch, vector_batch, id_batch)
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        with_retry("qdrant", "delete", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .request(reqwest::Method::POST, "/points/delete")
                .json(&json!({ "points": ids }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "qdrant delete failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        with_retry("qdrant", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || async {
            let response = self
                .request(reqwest::Method::POST, "/points/delete")
                .json(&json!({
                    "filter": { "must": [{ "key": KEY_ITEM_ID, "match": { "value": item_id } }] }
                }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "qdrant delete_by_item_id failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("qdrant", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .request(reqwest::Method::POST, "/points/scroll")
                .json(&json!({
                    "filter": { "must": [{ "key": KEY_ITEM_ID, "match": { "value": item_id } }] },
                    "with_payload": true,
                    "limit": 10_000,
                }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "qdrant scroll failed: {}", response.status());
            let body: serde_json::Value = response.json().await?;
            let points = body["result"]["points"].as_array().cloned().unwrap_or_default();
            Ok(points
                .iter()
                .map(|point| {
                    let native_id = point["id"].as_str().unwrap_or_default();
                    crate::stored_record_from_metadata(native_id, &point["payload"])
                })
                .collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("qdrant", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .request(reqwest::Method::POST, "/points/payload")
                .json(&json!({
                    "payload": { KEY_LAST_SEEN_AT: ts },
                    "points": ids,
                }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "qdrant touch failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        with_retry("qdrant", "delete_expired", TimeoutClass::Delete, &self.backoff, || async {
            let response = self
                .request(reqwest::Method::POST, "/points/delete")
                .json(&json!({
                    "filter": { "must": [{ "key": KEY_LAST_SEEN_AT, "range": { "lt": cutoff_ts } }] }
                }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "qdrant delete_expired failed: {}", response.status());
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
        let qdrant_filter = filter.map(metadata_filter_to_qdrant);
        with_retry("qdrant", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || async {
            let mut body = json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            });
            if let Some(filter) = &qdrant_filter {
                body["filter"] = filter.clone();
            }
            let response = self.request(reqwest::Method::POST, "/points/search").json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "qdrant search failed: {}", response.status());
            let body: serde_json::Value = response.json().await?;
            let points = body["result"].as_array().cloned().unwrap_or_default();
            Ok(points
                .iter()
                .map(|point| {
                    let native_id = point["id"].as_str().unwrap_or_default();
                    crate::stored_record_from_metadata(native_id, &point["payload"])
                })
                .collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        let count = with_retry("qdrant", "count", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self.request(reqwest::Method::POST, "/points/count").json(&json!({})).send().await?;
            anyhow::ensure!(response.status().is_success(), "qdrant count failed: {}", response.status());
            let body: serde_json::Value = response.json().await?;
            Ok(body["result"]["count"].as_u64().unwrap_or(0))
        })
        .await
        .map_err(anyhow::Error::from)?;
        Ok(Some(count))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let response = self
            .request(reqwest::Method::POST, "/points/delete")
            .json(&json!({ "filter": {} }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "qdrant delete_all failed: {}", response.status());
        Ok(())
    }
}

fn metadata_filter_to_qdrant(filter: &MetadataMap) -> serde_json::Value {
    let must: Vec<_> = filter
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": serde_json::to_value(value).unwrap_or(serde_json::Value::Null) } }))
        .collect();
    json!({ "must": must })
}

