use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, MetadataValue, StoredRecord};
use tokio::sync::Mutex;
use tokio_postgres::Client;

use crate::{batched, with_retry, Embedding, DEFAULT_BATCH_SIZE};

/// pgvector adapter (spec §4.5, §6): a Postgres table with a `vector`
/// column, addressed by `chunk_id` as primary key. `tokio-postgres` is the
/// only backend here that talks a binary wire protocol rather than HTTP, so
/// it owns a persistent connection behind a mutex instead of a stateless
/// `reqwest::Client`.
pub struct PgVectorAdapter {
    client: Mutex<Client>,
    table: String,
    batch_size: usize,
    backoff: BackoffConfig,
}

impl PgVectorAdapter {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client: Mutex::new(client),
            table: table.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn metadata_json(chunk: &Chunk) -> serde_json::Value {
        let map: serde_json::Map<_, _> = chunk
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(serde_json::Value::Null)))
            .collect();
        serde_json::Value::Object(map)
    }

    fn row_to_record(row: &tokio_postgres::Row) -> StoredRecord {
        let chunk_id: String = row.get("chunk_id");
        let item_id: String = row.get("item_id");
        let checksum: String = row.get("checksum");
        let last_seen_at: i64 = row.get("last_seen_at");
        let text: String = row.get("text");
        let metadata_json: serde_json::Value = row.get("metadata");
        StoredRecord {
            chunk_id,
            item_id,
            checksum,
            last_seen_at,
            text,
            metadata: crate::json_to_metadata_map(&metadata_json),
        }
    }
}

#[async_trait]
impl super::VectorStoreAdapter for PgVectorAdapter {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        for (chunk_batch, vector_batch, id_batch) in batched(chunks, vectors, ids, self.batch_size) {
            with_retry("pgvector", "add", TimeoutClass::ReadWrite, &self.backoff, || async {
                let client = self.client.lock().await;
                for ((chunk, vector), id) in chunk_batch.iter().zip(vector_batch).zip(id_batch) {
                    let vector = pgvector::Vector::from(vector.clone());
                    client
                        .execute(
                            &format!(
                                "INSERT INTO {} (chunk_id, item_id, checksum, last_seen_at, text, metadata, embedding) \
                                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                                 ON CONFLICT (chunk_id) DO UPDATE SET \
                                 item_id = EXCLUDED.item_id, checksum = EXCLUDED.checksum, \
                                 last_seen_at = EXCLUDED.last_seen_at, text = EXCLUDED.text, \
                                 metadata = EXCLUDED.metadata, embedding = EXCLUDED.embedding",
                                self.table
                            ),
                            &[
                                id,
                                &chunk.item_id(),
                                &chunk.checksum(),
                                &chunk.last_seen_at(),
                                &chunk.page_content,
                                &Self::metadata_json(chunk),
                                &vector,
                            ],
                        )
                        .await?;
                }
                Ok(())
            })
            .await
            .map_err(anyhow::Error::from)?;
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        with_retry("pgvector", "delete", TimeoutClass::ReadWrite, &self.backoff, || async {
            let client = self.client.lock().await;
            client
                .execute(&format!("DELETE FROM {} WHERE chunk_id = ANY($1)", self.table), &[&ids])
                .await?;
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        with_retry("pgvector", "delete_by_item_id", TimeoutClass::Delete, &self.backoff, || async {
            let client = self.client.lock().await;
            client
                .execute(&format!("DELETE FROM {} WHERE item_id = $1", self.table), &[&item_id])
                .await?;
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("pgvector", "get_by_item_id", TimeoutClass::ReadWrite, &self.backoff, || async {
            let client = self.client.lock().await;
            let rows = client
                .query(
                    &format!(
                        "SELECT chunk_id, item_id, checksum, last_seen_at, text, metadata FROM {} WHERE item_id = $1",
                        self.table
                    ),
                    &[&item_id],
                )
                .await?;
            Ok(rows.iter().map(Self::row_to_record).collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or_else(super::stamper_now);
        with_retry("pgvector", "touch", TimeoutClass::ReadWrite, &self.backoff, || async {
            let client = self.client.lock().await;
            client
                .execute(
                    &format!("UPDATE {} SET last_seen_at = $1 WHERE chunk_id = ANY($2)", self.table),
                    &[&ts, &ids],
                )
                .await?;
            Ok(())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        with_retry("pgvector", "delete_expired", TimeoutClass::Delete, &self.backoff, || async {
            let client = self.client.lock().await;
            client
                .execute(&format!("DELETE FROM {} WHERE last_seen_at < $1", self.table), &[&cutoff_ts])
                .await?;
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
        let filter_clause = filter.map(metadata_filter_to_sql).unwrap_or_default();
        let limit = k as i64;
        with_retry("pgvector", "search_by_vector", TimeoutClass::ReadWrite, &self.backoff, || async {
            let client = self.client.lock().await;
            let vector = pgvector::Vector::from(vector.to_vec());
            let query = format!(
                "SELECT chunk_id, item_id, checksum, last_seen_at, text, metadata FROM {} {} ORDER BY embedding <-> $1 LIMIT $2",
                self.table, filter_clause
            );
            let rows = client.query(&query, &[&vector, &limit]).await?;
            Ok(rows.iter().map(Self::row_to_record).collect())
        })
        .await
        .map_err(anyhow::Error::from)
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        let count: i64 = with_retry("pgvector", "count", TimeoutClass::ReadWrite, &self.backoff, || async {
            let client = self.client.lock().await;
            let row = client.query_one(&format!("SELECT count(*) FROM {}", self.table), &[]).await?;
            Ok(row.get::<_, i64>(0))
        })
        .await
        .map_err(anyhow::Error::from)?;
        Ok(Some(count.max(0) as u64))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let client = self.client.lock().await;
        client.execute(&format!("TRUNCATE TABLE {}", self.table), &[]).await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn metadata_filter_to_sql(filter: &MetadataMap) -> String {
    let clauses: Vec<String> = filter
        .iter()
        .map(|(key, value)| match value {
            MetadataValue::String(s) => format!("metadata ->> '{key}' = '{s}'"),
            other => format!("metadata ->> '{key}' = '{}'", other.stringify()),
        })
        .collect();
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

