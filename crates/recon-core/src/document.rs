use serde::{Deserialize, Serialize};

use crate::metadata::MetadataMap;

/// Mandatory metadata keys every persisted `Chunk` must carry (§3).
pub const KEY_ITEM_ID: &str = "item_id";
pub const KEY_CHUNK_ID: &str = "chunk_id";
pub const KEY_CHECKSUM: &str = "checksum";
pub const KEY_LAST_SEEN_AT: &str = "last_seen_at";
/// Legacy alias some backends persist a native id under (§9 open question).
pub const KEY_ID: &str = "id";

/// Keys excluded from the checksum's canonical JSON payload (§3 invariants).
pub const CHECKSUM_EXCLUDED_KEYS: &[&str] =
    &[KEY_CHUNK_ID, KEY_CHECKSUM, KEY_LAST_SEEN_AT, KEY_ITEM_ID, KEY_ID];

/// A Document: text plus metadata. Built in-process, mutated only by the
/// Stamper and Chunker, discarded after push (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: MetadataMap,
}

impl Document {
    pub fn new(page_content: impl Into<String>, metadata: MetadataMap) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    pub fn item_id(&self) -> &str {
        self.metadata
            .get(KEY_ITEM_ID)
            .map(|value| match value {
                crate::metadata::MetadataValue::String(s) => s.as_str(),
                _ => "",
            })
            .unwrap_or("")
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.metadata.get(KEY_CHUNK_ID).and_then(|value| match value {
            crate::metadata::MetadataValue::String(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn checksum(&self) -> &str {
        self.metadata
            .get(KEY_CHECKSUM)
            .map(|value| match value {
                crate::metadata::MetadataValue::String(s) => s.as_str(),
                _ => "",
            })
            .unwrap_or("")
    }

    pub fn last_seen_at(&self) -> i64 {
        self.metadata
            .get(KEY_LAST_SEEN_AT)
            .and_then(|value| match value {
                crate::metadata::MetadataValue::Int(i) => Some(*i),
                _ => None,
            })
            .unwrap_or(0)
    }
}

/// A `Document` that has been stamped with identity metadata and is ready to
/// be pushed to (or diffed against) a vector store. The type alias exists so
/// call sites can document intent; the shape is identical to `Document`
/// because the mandatory keys live in `metadata`.
pub type Chunk = Document;

/// A record as returned by a backend's `get_by_item_id` / `search_by_vector`.
/// Mirrors the persisted shape in §6: id, vector (opaque to the Engine),
/// metadata, and text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub chunk_id: String,
    pub item_id: String,
    pub checksum: String,
    pub last_seen_at: i64,
    pub text: String,
    pub metadata: MetadataMap,
}

impl StoredRecord {
    pub fn from_chunk(chunk: &Chunk, vector_chunk_id: Option<&str>) -> Self {
        let chunk_id = chunk
            .chunk_id()
            .or(vector_chunk_id)
            .unwrap_or_default()
            .to_string();
        Self {
            chunk_id,
            item_id: chunk.item_id().to_string(),
            checksum: chunk.checksum().to_string(),
            last_seen_at: chunk.last_seen_at(),
            text: chunk.page_content.clone(),
            metadata: chunk.metadata.clone(),
        }
    }
}
