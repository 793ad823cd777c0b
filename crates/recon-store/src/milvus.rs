use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, StoredRecord, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use serde_json::json;

use crate::{batched, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// Milvus adapter (spec §4.5, §6), against the v2 REST API
/// (`/v2/vectordb/entities/...`). Grounded on the teacher's reference
/// Python implementation's filter-expression style (`item_id == '...'`,
/// `last_seen_at < ...`) and its get-then-upsert touch pattern.
pub struct MilvusAdapter {
    client: reqwest::Client,
    base_url: String,
    collection_name: String,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl MilvusAdapter {
    pub fn new(base_url: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection_name: collection_name.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/entities{}", self.base_url, path)
    }

    async fn delete_by_filter(&self, filter: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.url("/delete"))
            .json(&json!({ "collectionName": self.collection_name, "filter": filter }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "milvus delete failed: {}", response.status());
        Ok(())
    }

    async fn query(&self, filter: &str, output_fields: &[&str]) -> anyhow::Result<Vec<serde_json::Value>> {
        let response = self
            .client
            .post(self.url("/query"))
            .json(&json!({
                "collectionName": self.collection_name,
                "filter": filter,
                "outputFields": output_fields,
            }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "milvus query failed: {}", response.status());
        let body: serde_json::Value = response.json().await?;
        Ok(body["data"].as_array().cloned().unwrap_or_default())
    }
}

fn entity_row(chunk: &Chunk, vector: &Embedding, id: &str) -> serde_json::Value {
    let mut row = serde_json::Map::new();
    row.insert("id".to_string(), serde_json::Value::String(id.to_string()));
    row.insert("vector".to_string(), json!(vector));
    row.insert("text".to_string(), serde_json::Value::String(chunk.page_content.clone()));
    for (key, value) in &chunk.metadata {
        row.insert(key.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
    }
    serde_json::Value::Object(row)
}

#[async_trait]
impl super::VectorStoreAdapter for MilvusAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, ids, self.batch_size) {
            with_retry("milvus", "add", TimeoutClass::ReadWrite, &self.backoff, || async {
                let data: Vec<_> = chunk_batch
                    .iter()
                    .zip(vector_batch)
                    .zip(id_batch)
                    .map(|((c, v), id)| entity_row(c, v, id))
                    .collect();
                let response = self
                    .client
                    .post(self.url("/upsert"))
                    .json(&json!({ "collectionName": self.collection_name, "data": data }))
                    .send()
                    .await?;
                anyhow::ensure!(response.status().is_success(), "milvus upsert failed: {}", response.status());
                Ok(())
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
        let filter = format!("id in [{}]", quoted.join(", "));
        with_retry("milvus", "delete", TimeoutClass::ReadWrite, &self.backoff, || self.delete_by_filter(&filter))
            .await
            .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        let filter = format!("{KEY_ITEM_ID} == '{item_id}'");
        with_retry("milvus", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || {
            self.delete_by_filter(&filter)
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        let filter = format!("{KEY_ITEM_ID} == '{item_id}'");
        with_retry("milvus", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || async {
            let rows = self.query(&filter, &["chunk_id", "item_id", "checksum", "last_seen_at"]).await?;
            Ok(rows
                .iter()
                .map(|row| {
                    let native_id = row["id"].as_str().unwrap_or_default();
                    crate::stored_record_from_metadata(native_id, row)
                })
                .collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("milvus", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
            let filter = format!("id in [{}]", quoted.join(", "));
            let rows = self.query(&filter, &["*"]).await?;
            let updated: Vec<_> = rows
                .into_iter()
                .map(|mut row| {
                    row[KEY_LAST_SEEN_AT] = json!(ts);
                    row
                })
                .collect();
            if updated.is_empty() {
                return Ok(());
            }
            let response = self
                .client
                .post(self.url("/upsert"))
                .json(&json!({ "collectionName": self.collection_name, "data": updated }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "milvus touch upsert failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        let filter = format!("{KEY_LAST_SEEN_AT} < {cutoff_ts}");
        with_retry("milvus", "delete_expired", TimeoutClass::Delete, &self.backoff, || {
            self.delete_by_filter(&filter)
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
        let expr = filter.map(metadata_filter_to_expr).unwrap_or_default();
        with_retry("milvus", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .client
                .post(self.url("/search"))
                .json(&json!({
                    "collectionName": self.collection_name,
                    "data": [vector],
                    "limit": k,
                    "filter": expr,
                }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "milvus search failed: {}", response.status());
            let body: serde_json::Value = response.json().await?;
            let rows = body["data"].as_array().cloned().unwrap_or_default();
            Ok(rows
                .iter()
                .map(|row| {
                    let native_id = row["id"].as_str().unwrap_or_default();
                    crate::stored_record_from_metadata(native_id, row)
                })
                .collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let rows = self.query("", &["id"]).await?;
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|r| r["id"].as_str().map(String::from))
            .collect();
        if ids.is_empty() {
            return Ok(());
        }
        let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
        self.delete_by_filter(&format!("id in [{}]", quoted.join(", "))).await
    }
}

fn metadata_filter_to_expr(filter: &MetadataMap) -> String {
    filter
        .iter()
        .map(|(key, value)| format!("{key} == '{}'", value.stringify()))
        .collect::<Vec<_>>()
        .join(" and ")
}
