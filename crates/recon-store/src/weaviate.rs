use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, MetadataValue, StoredRecord, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use serde_json::json;

use crate::{batched, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// Weaviate adapter (spec §4.5, §6). Objects are addressed by `chunk_id`
/// (Weaviate's own UUID object id); metadata lives in `properties`. Reads
/// that need an arbitrary `where` predicate go through GraphQL, since the
/// REST `/v1/objects` listing endpoint doesn't support one.
pub struct WeaviateAdapter {
    client: reqwest::Client,
    base_url: String,
    class_name: String,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl WeaviateAdapter {
    pub fn new(base_url: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            class_name: class_name.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    async fn delete_where(&self, where_clause: serde_json::Value) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/v1/batch/objects", self.base_url))
            .json(&json!({
                "match": { "class": self.class_name, "where": where_clause }
            }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "weaviate batch delete failed: {}", response.status());
        Ok(())
    }

    async fn graphql_get(&self, where_clause: serde_json::Value, limit: usize) -> anyhow::Result<Vec<StoredRecord>> {
        let query = format!(
            "{{ Get {{ {class}(where: {where}, limit: {limit}) {{ _additional {{ id vector }} item_id checksum last_seen_at }} }} }}",
            class = self.class_name,
            where = where_clause,
            limit = limit,
        );
        self.run_graphql_get(query).await
    }

    async fn graphql_get_near_vector(
        &self,
        vector: &[f32],
        k: usize,
        where_clause: Option<serde_json::Value>,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let query = near_vector_query(&self.class_name, vector, k, where_clause);
        self.run_graphql_get(query).await
    }

    async fn run_graphql_get(&self, query: String) -> anyhow::Result<Vec<StoredRecord>> {
        let response = self
            .client
            .post(format!("{}/v1/graphql", self.base_url))
            .json(&json!({ "query": query }))
            .send()
            .await?;
        anyhow::ensure!(response.status().is_success(), "weaviate graphql query failed: {}", response.status());
        let body: serde_json::Value = response.json().await?;
        let objects = body["data"]["Get"][&self.class_name].as_array().cloned().unwrap_or_default();
        Ok(objects
            .iter()
            .map(|object| {
                let native_id = object["_additional"]["id"].as_str().unwrap_or_default();
                crate::stored_record_from_metadata(native_id, object)
            })
            .collect())
    }
}

/// Weaviate `where` filter for an arbitrary metadata predicate (spec §4.5:
/// "optional metadata predicate"), combining per-field `Equal` clauses with
/// `And` the way `delete_where`/`graphql_get` already combine a single clause.
fn metadata_filter_to_where(filter: &MetadataMap) -> serde_json::Value {
    let operands: Vec<_> = filter
        .iter()
        .map(|(key, value)| {
            let (value_key, value_json) = match value {
                MetadataValue::String(s) => ("valueText", json!(s)),
                MetadataValue::Int(i) => ("valueInt", json!(i)),
                MetadataValue::Float(f) => ("valueNumber", json!(f)),
                MetadataValue::Bool(b) => ("valueBoolean", json!(b)),
                MetadataValue::Null => ("valueText", serde_json::Value::Null),
            };
            json!({ "path": [key], "operator": "Equal", value_key: value_json })
        })
        .collect();
    if operands.len() == 1 {
        operands.into_iter().next().unwrap()
    } else {
        json!({ "operator": "And", "operands": operands })
    }
}

/// GraphQL query combining `nearVector` with an optional `where` predicate.
fn near_vector_query(class_name: &str, vector: &[f32], k: usize, where_clause: Option<serde_json::Value>) -> String {
    let near_vector = format!("nearVector: {{ vector: {vector:?} }}");
    let args = match where_clause {
        Some(where_clause) => format!("{near_vector}, where: {where_clause}, limit: {k}"),
        None => format!("{near_vector}, limit: {k}"),
    };
    format!("{{ Get {{ {class_name}({args}) {{ _additional {{ id vector }} item_id checksum last_seen_at }} }} }}")
}

fn chunk_properties(chunk: &Chunk) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    for (key, value) in &chunk.metadata {
        properties.insert(key.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null));
    }
    properties.insert("text".to_string(), serde_json::Value::String(chunk.page_content.clone()));
    serde_json::Value::Object(properties)
}

#[async_trait]
impl super::VectorStoreAdapter for WeaviateAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, ids, self.batch_size) {
            with_retry("weaviate", "add", TimeoutClass::ReadWrite, &self.backoff, || async {
                let objects: Vec<_> = chunk_batch
                    .iter()
                    .zip(vector_batch)
                    .zip(id_batch)
                    .map(|((chunk, vector), id)| {
                        json!({
                            "class": self.class_name,
                            "id": id,
                            "properties": chunk_properties(chunk),
                            "vector": vector,
                        })
                    })
                    .collect();
                let response = self
                    .client
                    .post(format!("{}/v1/batch/objects", self.base_url))
                    .json(&json!({ "objects": objects }))
                    .send()
                    .await?;
                anyhow::ensure!(response.status().is_success(), "weaviate batch add failed: {}", response.status());
                Ok(())
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        with_retry("weaviate", "delete", TimeoutClass::ReadWrite, &self.backoff, || async {
            for id in ids {
                let response = self
                    .client
                    .delete(format!("{}/v1/objects/{}/{}", self.base_url, self.class_name, id))
                    .send()
                    .await?;
                anyhow::ensure!(
                    response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND,
                    "weaviate delete failed: {}",
                    response.status()
                );
            }
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        with_retry("weaviate", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || {
            self.delete_where(json!({
                "path": [KEY_ITEM_ID],
                "operator": "Equal",
                "valueText": item_id,
            }))
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("weaviate", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || {
            self.graphql_get(
                json!({ "path": [KEY_ITEM_ID], "operator": "Equal", "valueText": item_id }),
                10_000,
            )
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("weaviate", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            for id in ids {
                let response = self
                    .client
                    .patch(format!("{}/v1/objects/{}/{}", self.base_url, self.class_name, id))
                    .json(&json!({ "properties": { KEY_LAST_SEEN_AT: ts } }))
                    .send()
                    .await?;
                anyhow::ensure!(response.status().is_success(), "weaviate touch failed: {}", response.status());
            }
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        with_retry("weaviate", "delete_expired", TimeoutClass::Delete, &self.backoff, || {
            self.delete_where(json!({
                "path": [KEY_LAST_SEEN_AT],
                "operator": "LessThan",
                "valueInt": cutoff_ts,
            }))
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
        with_retry("weaviate", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || {
            self.graphql_get_near_vector(vector, k, where_clause.clone())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        let count = with_retry("weaviate", "count", TimeoutClass::ReadWrite, &self.backoff, || async {
            let query = format!("{{ Aggregate {{ {class} {{ meta {{ count }} }} }} }}", class = self.class_name);
            let response = self
                .client
                .post(format!("{}/v1/graphql", self.base_url))
                .json(&json!({ "query": query }))
                .send()
                .await?;
            anyhow::ensure!(response.status().is_success(), "weaviate aggregate failed: {}", response.status());
            let body: serde_json::Value = response.json().await?;
            Ok(body["data"]["Aggregate"][&self.class_name][0]["meta"]["count"].as_u64().unwrap_or(0))
        })
        .await
        .map_err(anyhow::Error::from)?;
        Ok(Some(count))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        self.delete_where(json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_a_single_field_filter_when_converting_then_it_is_a_bare_equal_clause() {
        let mut filter = MetadataMap::new();
        filter.insert("source".into(), "crawler".into());
        let where_clause = metadata_filter_to_where(&filter);
        assert_eq!(
            where_clause,
            json!({ "path": ["source"], "operator": "Equal", "valueText": "crawler" })
        );
    }

    #[test]
    fn given_a_multi_field_filter_when_converting_then_clauses_are_anded_together() {
        let mut filter = MetadataMap::new();
        filter.insert("source".into(), "crawler".into());
        filter.insert("priority".into(), 2_i64.into());
        let where_clause = metadata_filter_to_where(&filter);
        assert_eq!(where_clause["operator"], json!("And"));
        assert_eq!(where_clause["operands"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn given_a_filter_when_building_the_near_vector_query_then_where_and_near_vector_both_appear() {
        let mut filter = MetadataMap::new();
        filter.insert("source".into(), "crawler".into());
        let where_clause = metadata_filter_to_where(&filter);
        let query = near_vector_query("Docs", &[0.1, 0.2], 5, Some(where_clause));
        assert!(query.contains("nearVector"));
        assert!(query.contains("\"source\""));
        assert!(query.contains("limit: 5"));
    }

    #[test]
    fn given_no_filter_when_building_the_near_vector_query_then_no_where_argument_is_present() {
        let query = near_vector_query("Docs", &[0.1, 0.2], 5, None);
        assert!(query.contains("nearVector"));
        assert!(!query.contains("where:"));
    }
}
