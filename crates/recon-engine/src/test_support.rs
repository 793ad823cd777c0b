//! In-memory `VectorStoreAdapter` fixture shared by this crate's unit and
//! end-to-end tests. Not part of the public API.

use std::sync::Mutex;

use async_trait::async_trait;
use recon_core::{Chunk, MetadataMap, StoredRecord};
use recon_store::{Embedding, VectorStoreAdapter};

struct Entry {
    record: StoredRecord,
    vector: Embedding,
}

pub struct InMemoryStore {
    entries: Mutex<Vec<Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    pub fn seed(&self, chunk: Chunk, vector: Embedding) {
        let last_seen_at = chunk.last_seen_at();
        self.seed_with_last_seen_at(chunk, vector, last_seen_at);
    }

    pub fn seed_with_last_seen_at(&self, chunk: Chunk, vector: Embedding, last_seen_at: i64) {
        let mut record = StoredRecord::from_chunk(&chunk, None);
        record.last_seen_at = last_seen_at;
        self.entries.lock().unwrap().push(Entry { record, vector });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get(&self, chunk_id: &str) -> Option<StoredRecord> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.record.chunk_id == chunk_id)
            .map(|e| e.record.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStoreAdapter for InMemoryStore {
    async fn add(&self, chunks: &[Chunk], vectors: &[Embedding], ids: &[String]) -> anyhow::Result<Vec<String>> {
        let mut entries = self.entries.lock().unwrap();
        for ((chunk, vector), id) in chunks.iter().zip(vectors).zip(ids) {
            entries.retain(|e| &e.record.chunk_id != id);
            let mut record = StoredRecord::from_chunk(chunk, Some(id));
            record.chunk_id = id.clone();
            entries.push(Entry { record, vector: vector.clone() });
        }
        Ok(ids.to_vec())
    }

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| !ids.contains(&e.record.chunk_id));
        Ok(())
    }

    async fn delete_by_item_id(&self, item_id: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.record.item_id != item_id);
        Ok(())
    }

    async fn get_by_item_id(&self, item_id: &str) -> anyhow::Result<Vec<StoredRecord>> {
        if item_id.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.record.item_id == item_id)
            .map(|e| e.record.clone())
            .collect())
    }

    async fn touch(&self, ids: &[String], ts: Option<i64>) -> anyhow::Result<()> {
        let ts = ts.unwrap_or(0);
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if ids.contains(&entry.record.chunk_id) {
                entry.record.last_seen_at = ts;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self, cutoff_ts: i64) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.record.last_seen_at >= cutoff_ts);
        Ok(())
    }

    async fn search_by_vector(
        &self,
        _vector: &[f32],
        k: usize,
        filter: Option<&MetadataMap>,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let _ = filter;
        Ok(self.entries.lock().unwrap().iter().take(k).map(|e| e.record.clone()).collect())
    }

    async fn count(&self) -> anyhow::Result<Option<u64>> {
        Ok(Some(self.entries.lock().unwrap().len() as u64))
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}
