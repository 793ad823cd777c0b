//! Shared domain types for the reconciliation core: `Document`/`Chunk`
//! shapes, the canonical-JSON checksum primitives, and the closed error
//! taxonomy every other crate in this workspace builds on.

pub mod canonical;
pub mod document;
pub mod error;
pub mod metadata;

pub use canonical::{canonical_json_for_checksum, compute_checksum, compute_item_id, digest};
pub use document::{
    Chunk, Document, StoredRecord, CHECKSUM_EXCLUDED_KEYS, KEY_CHECKSUM, KEY_CHUNK_ID, KEY_ID,
    KEY_ITEM_ID, KEY_LAST_SEEN_AT,
};
pub use error::{ReconError, Result};
pub use metadata::{DatasetItem, MetadataMap, MetadataValue};
