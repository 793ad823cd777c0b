use std::time::{SystemTime, UNIX_EPOCH};

use recon_core::{compute_checksum, compute_item_id, Document, KEY_CHECKSUM, KEY_CHUNK_ID, KEY_ITEM_ID, KEY_LAST_SEEN_AT};
use uuid::Uuid;

/// Current wall-clock time as a UTC epoch-second count. A thin wrapper so
/// `stamp_item` callers needn't reach for `std::time` directly.
pub fn now_utc_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Identity Stamper, item half (spec §4.3). Computes `item_id` from the
/// configured primary fields and `checksum` over the document's content
/// before chunking, so every chunk produced from this Document shares one
/// checksum. Sets `last_seen_at` to `now_ts`.
pub fn stamp_item(doc: &mut Document, primary_fields: &[String], now_ts: i64) {
    let checksum = compute_checksum(doc);

    let values: Vec<String> = primary_fields
        .iter()
        .map(|key| doc.metadata.get(key).map(|v| v.stringify()).unwrap_or_default())
        .collect();
    let item_id = compute_item_id(&values);

    doc.metadata.insert(KEY_ITEM_ID.to_string(), item_id.into());
    doc.metadata.insert(KEY_CHECKSUM.to_string(), checksum.into());
    doc.metadata.insert(KEY_LAST_SEEN_AT.to_string(), now_ts.into());
}

/// Identity Stamper, chunk half (spec §4.3). Assigns a fresh UUID v4
/// `chunk_id` only if the chunk doesn't already carry one (e.g. a Document
/// that bypassed the Chunker because chunking is disabled may already be
/// addressed by an upstream id).
pub fn stamp_chunk(chunk: &mut Document) {
    if chunk.chunk_id().is_some() {
        return;
    }
    let chunk_id = Uuid::new_v4().to_string();
    chunk.metadata.insert(KEY_CHUNK_ID.to_string(), chunk_id.into());
}
