//! Reconciliation Engine public operations (spec §4.4): `append`, `upsert`,
//! and `delta` strategies, all ending in the fixed delete → add → touch
//! execution order.

use std::collections::HashMap;
use std::sync::Arc;

use recon_core::{Chunk, ReconError};
use recon_store::{Embedding, VectorStoreAdapter};

use crate::plan::{compute_delta_plan, DEFAULT_WORKER_POOL_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Append,
    Upsert,
    Delta,
}

/// What a `reconcile` call actually did, by id. `deleted` is empty for
/// `upsert`: that strategy deletes by `item_id`, not by the chunk ids it
/// never fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub touched: Vec<String>,
    pub deleted: Vec<String>,
}

/// A failed reconcile, carrying whatever was actually applied before the
/// failing step (spec §7: "successful chunks are always emitted to the
/// output sink even on PARTIAL_FAILURE") so a caller's output sink can
/// still record the work that landed.
#[derive(Debug)]
pub struct ReconcileError {
    pub source: ReconError,
    pub partial: ReconcileOutcome,
}

impl ReconcileError {
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }

    fn new(source: ReconError, partial: ReconcileOutcome) -> Self {
        Self { source, partial }
    }
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.source.fmt(f)
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

type ReconcileResult = Result<ReconcileOutcome, ReconcileError>;

pub async fn reconcile(
    store: &Arc<dyn VectorStoreAdapter>,
    chunks: &[Chunk],
    vectors: &[Embedding],
    strategy: Strategy,
) -> ReconcileResult {
    reconcile_with_worker_pool(store, chunks, vectors, strategy, DEFAULT_WORKER_POOL_SIZE).await
}

pub async fn reconcile_with_worker_pool(
    store: &Arc<dyn VectorStoreAdapter>,
    chunks: &[Chunk],
    vectors: &[Embedding],
    strategy: Strategy,
    worker_pool_size: usize,
) -> ReconcileResult {
    if chunks.len() != vectors.len() {
        let message = format!(
            "chunk count ({}) does not match vector count ({})",
            chunks.len(),
            vectors.len()
        );
        return Err(ReconcileError::new(ReconError::ConfigInvalid(message), ReconcileOutcome::default()));
    }
    if chunks.is_empty() {
        return Ok(ReconcileOutcome::default());
    }

    match strategy {
        Strategy::Append => {
            let ids = chunk_ids(chunks);
            let added = add_all(store, chunks, vectors, &ids)
                .await
                .map_err(|error| ReconcileError::new(error, ReconcileOutcome::default()))?;
            Ok(ReconcileOutcome { added, ..Default::default() })
        }
        Strategy::Upsert => reconcile_upsert(store, chunks, vectors).await,
        Strategy::Delta => reconcile_delta(store, chunks, vectors, worker_pool_size).await,
    }
}

async fn reconcile_upsert(
    store: &Arc<dyn VectorStoreAdapter>,
    chunks: &[Chunk],
    vectors: &[Embedding],
) -> ReconcileResult {
    let mut item_order = Vec::new();
    let mut seen = HashMap::new();
    for chunk in chunks {
        let item_id = chunk.item_id().to_string();
        seen.entry(item_id.clone()).or_insert_with(|| {
            item_order.push(item_id.clone());
        });
    }

    let partial = ReconcileOutcome::default();
    for item_id in &item_order {
        store.delete_by_item_id(item_id).await.map_err(|error| {
            ReconcileError::new(partial_failure("reconcile", "delete_by_item_id", error), partial.clone())
        })?;
    }

    let ids = chunk_ids(chunks);
    let added = add_all(store, chunks, vectors, &ids)
        .await
        .map_err(|error| ReconcileError::new(error, partial.clone()))?;
    Ok(ReconcileOutcome { added, ..Default::default() })
}

async fn reconcile_delta(
    store: &Arc<dyn VectorStoreAdapter>,
    chunks: &[Chunk],
    vectors: &[Embedding],
    worker_pool_size: usize,
) -> ReconcileResult {
    let plan = compute_delta_plan(store, chunks, worker_pool_size).await;
    let mut partial = ReconcileOutcome::default();

    if !plan.to_delete.is_empty() {
        store.delete(&plan.to_delete).await.map_err(|error| {
            ReconcileError::new(partial_failure("reconcile", "delete", error), partial.clone())
        })?;
        partial.deleted = plan.to_delete.clone();
    }

    let mut add_chunks = Vec::with_capacity(plan.to_add.len());
    let mut add_vectors = Vec::with_capacity(plan.to_add.len());
    for &idx in &plan.to_add {
        add_chunks.push(chunks[idx].clone());
        add_vectors.push(vectors[idx].clone());
    }
    let add_ids = chunk_ids(&add_chunks);
    let added = add_all(store, &add_chunks, &add_vectors, &add_ids)
        .await
        .map_err(|error| ReconcileError::new(error, partial.clone()))?;
    partial.added = added.clone();

    if !plan.to_touch.is_empty() {
        // Every chunk in one incoming batch was stamped with the same `now`
        // (spec §4.3); reuse it rather than letting each adapter read its own
        // wall clock, so touched and freshly-added records agree on `last_seen_at`.
        let run_ts = chunks.first().map(|c| c.last_seen_at());
        store.touch(&plan.to_touch, run_ts).await.map_err(|error| {
            ReconcileError::new(partial_failure("reconcile", "touch", error), partial.clone())
        })?;
    }

    Ok(ReconcileOutcome { added, touched: plan.to_touch, deleted: plan.to_delete })
}

pub async fn expire(store: &Arc<dyn VectorStoreAdapter>, cutoff_ts: i64) -> recon_core::Result<()> {
    if cutoff_ts <= 0 {
        return Ok(());
    }
    store
        .delete_expired(cutoff_ts)
        .await
        .map_err(|error| partial_failure("expire", "delete_expired", error))
}

async fn add_all(
    store: &Arc<dyn VectorStoreAdapter>,
    chunks: &[Chunk],
    vectors: &[Embedding],
    ids: &[String],
) -> recon_core::Result<Vec<String>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    store.add(chunks, vectors, ids).await.map_err(|error| partial_failure("reconcile", "add", error))
}

fn chunk_ids(chunks: &[Chunk]) -> Vec<String> {
    chunks.iter().map(|c| c.chunk_id().unwrap_or_default().to_string()).collect()
}

fn partial_failure(phase: &str, operation: &str, error: anyhow::Error) -> ReconError {
    ReconError::PartialFailure {
        phase: phase.to_string(),
        operation: operation.to_string(),
        message: error.to_string(),
    }
}
