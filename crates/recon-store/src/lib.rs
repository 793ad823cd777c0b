//! Vector Store Adapter (spec §4.5): a uniform contract over seven backend
//! implementations, dispatched as a `dyn VectorStoreAdapter` trait object so
//! the Engine and orchestrator stay backend-agnostic. Each concrete adapter
//! owns its own transport client; none is shared across adapters (§5: "no
//! process-wide mutable state").

mod chroma;
mod milvus;
mod opensearch;
mod pgvector;
mod pinecone;
mod qdrant;
mod weaviate;

pub use chroma::ChromaAdapter;
pub use milvus::MilvusAdapter;
pub use opensearch::OpenSearchAdapter;
pub use pgvector::PgVectorAdapter;
pub use pinecone::PineconeAdapter;
pub use qdrant::QdrantAdapter;
pub use weaviate::WeaviateAdapter;

use async_trait::async_trait;
use recon_backoff::{BackoffConfig, TimeoutClass};
use recon_core::{Chunk, MetadataMap, ReconError, Result as ReconResult, StoredRecord};

/// Insert batch size absent a backend-specific override (spec §4.5:
/// "chunked at a backend-appropriate batch size (≈300 default)").
pub const DEFAULT_BATCH_SIZE: usize = 300;

/// An embedded chunk's vector, opaque to the Engine (spec §3: "vector
/// (opaque to the Engine)").
pub type Embedding = Vec<f32>;

/// The uniform operation set every backend adapter implements (spec §4.5).
#[async_trait]
pub trait VectorStoreAdapter: Send + Sync {
    /// Insert or replace by id, batching internally. Returns the ids
    /// actually stored, in input order.
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>>;

    /// Best-effort delete by id; unknown ids are not errors.
    async fn delete(&self, ids: &[String]) -> anyhow::Result<()>;

    /// Delete every record whose metadata `item_id` equals the argument.
    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()>;

    /// Records with at least `{chunk_id, item_id, checksum, last_seen_at}`
    /// in metadata. An empty `item_id` returns an empty list.
    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>>;

    /// Set `last_seen_at = ts` (default: now) on each id. Bulk where the
    /// backend supports it.
    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()>;

    /// Delete records with `last_seen_at < cutoff_ts`. Backends lacking a
    /// predicate-delete primitive search first, then delete by id.
    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()>;

    /// Nearest-neighbour search with an optional metadata predicate.
    async fn search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataMap>,
    ) -> anyhow::Result<Vec<StoredRecord>>;

    /// Exact or approximate record count, used only for the delta plan's
    /// empty-store short-circuit. `None` means the backend doesn't support
    /// cheap counting.
    async fn count(&self) -> anyhow::Result<Option<u64>> {
        Ok(None)
    }

    /// Delete every record in the configured scope. Tests only.
    async fn delete_all(&self) -> anyhow::Result<()>;

    /// Release client resources. Idempotent.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether this backend stores ids as `"{item_id}#{chunk_id}"` and
    /// serves `get_by_item_id`/`delete_by_item_id` via prefix listing
    /// (spec §4.5 "Id prefixing"). Only Pinecone currently opts in.
    fn supports_id_prefix(&self) -> bool {
        false
    }
}

/// Retry `do_stuff` under the backend's backoff policy, translating a
/// deadline overrun into `BACKEND_OPERATION_FAILED` (spec §7).
async fn with_retry<F, Fut, T>(
    backend: &str,
    operation: &str,
    class: TimeoutClass,
    config: &BackoffConfig,
    do_stuff: F,
) -> ReconResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    recon_backoff::retry_with_cap(operation, class, config, do_stuff)
        .await
        .map_err(|deadline_exceeded| ReconError::BackendOperationFailed {
            backend: backend.to_string(),
            operation: operation.to_string(),
            message: deadline_exceeded.last_error,
        })
}

/// Split `chunks`/`vectors`/`ids` into parallel batches of at most
/// `batch_size`.
fn batched<'a>(
    chunks: &'a [Chunk],
    vectors: &'a [Embedding],
    ids: &'a [String],
    batch_size: usize,
) -> impl Iterator<Item = (&'a [Chunk], &'a [Embedding], &'a [String])> {
    let batch_size = batch_size.max(1);
    chunks
        .chunks(batch_size)
        .zip(vectors.chunks(batch_size))
        .zip(ids.chunks(batch_size))
        .map(|((c, v), i)| (c, v, i))
}

/// Build the stored id for a chunk given the backend's id-prefix capability
/// (spec §4.5: `"{item_id}#{chunk_id}"` when enabled).
fn stored_id(chunk: &Chunk, use_id_prefix: bool) -> String {
    let chunk_id = chunk.chunk_id().unwrap_or_default();
    if use_id_prefix && !chunk_id.contains('#') {
        format!("{}#{}", chunk.item_id(), chunk_id)
    } else {
        chunk_id.to_string()
    }
}

/// Current UTC epoch seconds, used as `touch`'s default `ts` across
/// adapters when the caller doesn't supply one (spec §4.5: "default: now").
pub(crate) fn stamper_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Strip the `"{item_id}#"` prefix from a stored id, returning the bare
/// `chunk_id` (spec §4.5: "the prefix is stripped only when the caller
/// needs the bare chunk_id").
fn strip_id_prefix(stored_id: &str) -> &str {
    stored_id.split('#').next_back().unwrap_or(stored_id)
}

/// Flatten a backend's returned metadata payload (plain JSON object) into
/// `MetadataMap`. Nested objects/arrays don't occur in practice because the
/// Identity Stamper only ever writes scalar values (spec §3: "metadata stays
/// flat"); any that slip through are dropped rather than panicking.
pub(crate) fn json_to_metadata_map(value: &serde_json::Value) -> MetadataMap {
    use recon_core::MetadataValue;

    let mut map = MetadataMap::new();
    if let serde_json::Value::Object(fields) = value {
        for (key, v) in fields {
            let parsed = match v {
                serde_json::Value::String(s) => Some(MetadataValue::String(s.clone())),
                serde_json::Value::Bool(b) => Some(MetadataValue::Bool(*b)),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Some(MetadataValue::Int(i))
                    } else {
                        n.as_f64().map(MetadataValue::Float)
                    }
                }
                serde_json::Value::Null => Some(MetadataValue::Null),
                _ => None,
            };
            if let Some(value) = parsed {
                map.insert(key.clone(), value);
            }
        }
    }
    map
}

/// Build a `StoredRecord` from a backend's metadata payload and the id the
/// backend natively assigned, falling back to that native id when the
/// payload itself lacks a `chunk_id` (spec §4.4: "a stored record whose
/// metadata lacks chunk_id falls back to the backend's native id").
pub(crate) fn stored_record_from_metadata(
    native_id: &str,
    metadata_json: &serde_json::Value,
) -> StoredRecord {
    let mut metadata = json_to_metadata_map(metadata_json);
    let chunk_id = metadata
        .get(recon_core::KEY_CHUNK_ID)
        .map(|v| v.stringify())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| native_id.to_string());
    let item_id = metadata
        .get(recon_core::KEY_ITEM_ID)
        .map(|v| v.stringify())
        .unwrap_or_default();
    let checksum = metadata
        .get(recon_core::KEY_CHECKSUM)
        .map(|v| v.stringify())
        .unwrap_or_default();
    let last_seen_at = metadata
        .get(recon_core::KEY_LAST_SEEN_AT)
        .and_then(|v| match v {
            recon_core::MetadataValue::Int(i) => Some(*i),
            _ => None,
        })
        .unwrap_or(0);

    metadata.remove(recon_core::KEY_CHUNK_ID);
    metadata.remove(recon_core::KEY_ITEM_ID);
    metadata.remove(recon_core::KEY_CHECKSUM);
    metadata.remove(recon_core::KEY_LAST_SEEN_AT);

    StoredRecord {
        chunk_id,
        item_id,
        checksum,
        last_seen_at,
        text: String::new(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::{Document, MetadataMap};

    fn chunk_with(item_id: &str, chunk_id: &str) -> Chunk {
        let mut metadata = MetadataMap::new();
        metadata.insert("item_id".into(), item_id.into());
        metadata.insert("chunk_id".into(), chunk_id.into());
        Document::new("text", metadata)
    }

    #[test]
    fn given_id_prefix_disabled_when_building_stored_id_then_it_is_the_bare_chunk_id() {
        let chunk = chunk_with("item-1", "chunk-1");
        assert_eq!(stored_id(&chunk, false), "chunk-1");
    }

    #[test]
    fn given_id_prefix_enabled_when_building_stored_id_then_it_is_item_and_chunk_joined() {
        let chunk = chunk_with("item-1", "chunk-1");
        assert_eq!(stored_id(&chunk, true), "item-1#chunk-1");
    }

    #[test]
    fn given_already_prefixed_chunk_id_when_building_stored_id_then_it_is_left_untouched() {
        let chunk = chunk_with("item-1", "item-1#chunk-1");
        assert_eq!(stored_id(&chunk, true), "item-1#chunk-1");
    }

    #[test]
    fn given_prefixed_stored_id_when_stripping_then_bare_chunk_id_is_recovered() {
        assert_eq!(strip_id_prefix("item-1#chunk-1"), "chunk-1");
        assert_eq!(strip_id_prefix("chunk-1"), "chunk-1");
    }

    #[test]
    fn given_uneven_batch_when_batching_then_last_batch_is_partial() {
        let chunks: Vec<Chunk> = (0..7).map(|i| chunk_with("item", &i.to_string())).collect();
        let vectors: Vec<Embedding> = (0..7).map(|_| vec![0.0_f32; 4]).collect();
        let ids: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        let batches: Vec<_> = batched(&chunks, &vectors, &ids, 3).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].0.len(), 1);
    }
}
