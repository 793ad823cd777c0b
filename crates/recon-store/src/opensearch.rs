use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, StoredRecord, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use serde_json::json;

use crate::{batched, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// OpenSearch adapter (spec §4.5, §6), against a k-NN-enabled index using
/// the bulk/search/update-by-query/delete-by-query REST APIs.
pub struct OpenSearchAdapter {
    client: reqwest::Client,
    base_url: String,
    index: String,
    vector_field: String,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl OpenSearchAdapter {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            index: index.into(),
            vector_field: "embedding".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index, path)
    }
}

#[async_trait]
impl super::VectorStoreAdapter for OpenSearchAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, ids, self.batch_size) {
            with_retry("opensearch", "add", TimeoutClass::ReadWrite, &self.backoff, || async {
                let mut ndjson = String::new();
                for ((chunk, vector), id) in chunk_batch.iter().zip(vector_batch).zip(id_batch) {
                    ndjson.push_str(&json!({ "index": { "_id": id } }).to_string());
                    ndjson.push('\n');
                    let mut doc = serde_json::Map::new();
                    for (key, value) in &chunk.metadata {
                        doc.insert(key.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
                    }
                    doc.insert("text".to_string(), serde_json::Value::String(chunk.page_content.clone()));
                    doc.insert(self.vector_field.clone(), json!(vector));
                    ndjson.push_str(&serde_json::Value::Object(doc).to_string());
                    ndjson.push('\n');
                }
                let response = self
                    .client
                    .post(self.url("/_bulk"))
                    .header("content-type", "application/x-ndjson")
                    .body(ndjson)
                    .send()
                    .await?;
                anyhow::ensure!(response.status().is_success(), "opensearch bulk index failed: {}", response.status());
                Ok(())
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        with_retry("opensearch", "delete", TimeoutClass::ReadWrite, &self.backoff, || async {
            let mut ndjson = String::new();
            for id in ids {
                ndjson.push_str(&json!({ "delete": { "_id": id } }).to_string());
                ndjson.push('\n');
            }
            let response = self
                .client
                .post(self.url("/_bulk"))
                .header("content-type", "application/x-ndjson")
                .body(ndjson)
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "opensearch bulk delete failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        with_retry("opensearch", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || async {
            let response = self
                .client
                .post(self.url("/_delete_by_query"))
                .json(&json!({ "query": { "term": { KEY_ITEM_ID: item_id } } }))
                .send()
                .await?;
            anyhow::ensure!(
                response.status().is_success(),
                "opensearch delete_by_query failed: {}",
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
        with_retry("opensearch", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .client
                .post(self.url("/_search"))
                .json(&json!({ "query": { "term": { KEY_ITEM_ID: item_id } }, "size": 10_000 }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "opensearch search failed: {}", response.status());
            Ok(parse_hits(&response.json().await?))
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("opensearch", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self
                .client
                .post(self.url("/_update_by_query"))
                .json(&json!({
                    "query": { "ids": { "values": ids } },
                    "script": {
                        "source": format!("ctx._source.{KEY_LAST_SEEN_AT} = params.ts"),
                        "params": { "ts": ts },
                    },
                }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "opensearch update_by_query failed: {}", response.status());
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        with_retry("opensearch", "delete_expired", TimeoutClass::Delete, &self.backoff, || async {
            let response = self
                .client
                .post(self.url("/_delete_by_query"))
                .json(&json!({ "query": { "range": { KEY_LAST_SEEN_AT: { "lt": cutoff_ts } } } }))
                .send()
                .await?;
            anyhow::ensure!(
                response.status().is_success(),
                "opensearch delete_expired failed: {}",
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
        let post_filter = filter.map(metadata_filter_to_query);
        with_retry("opensearch", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || async {
            let mut knn_field = serde_json::Map::new();
            knn_field.insert(self.vector_field.clone(), json!({ "vector": vector, "k": k }));
            let mut body = json!({
                "size": k,
                "query": { "knn": serde_json::Value::Object(knn_field) },
            });
            if let Some(filter) = &post_filter {
                body["post_filter"] = filter.clone();
            }
            let response = self.client.post(self.url("/_search")).json(&body).send().await?;
            anyhow::ensure!(response.status().is_success(), "opensearch knn search failed: {}", response.status());
            Ok(parse_hits(&response.json().await?))
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        let count = with_retry("opensearch", "count", TimeoutClass::ReadWrite, &self.backoff, || async {
            let response = self.client.get(self.url("/_count")).send().await?;
            anyhow::ensure!(response.status().is_success(), "opensearch count failed: {}", response.status());
            let body: serde_json::Value = response.json().await?;
            Ok(body["count"].as_u64().unwrap_or(0))
        })
        .await
        .map_err(anyhow::Error::from)?;
        Ok(Some(count))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.url("/_delete_by_query"))
            .json(&json!({ "query": { "match_all": {} } }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "opensearch delete_all failed: {}", response.status());
        Ok(())
    }
}

fn metadata_filter_to_query(filter: &MetadataMap) -> serde_json::Value {
    let clauses: Vec<_> = filter
        .iter()
        .map(|(key, value)| json!({ "term": { key: serde_json::to_value(value).unwrap_or(serde_json::Value::Null) } }))
        .collect();
    json!({ "bool": { "must": clauses } })
}

fn parse_hits(body: &serde_json::Value) -> Vec<StoredRecord> {
    body["hits"]["hits"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|hit| {
            let native_id = hit["_id"].as_str().unwrap_or_default();
            let mut record = crate::stored_record_from_metadata(native_id, &hit["_source"]);
            record.text = hit["_source"]["text"].as_str().unwrap_or_default().to_string();
            record
        })
        .collect()
}
