//! Output sink (spec §7: "Successful chunks are always emitted to the
//! output sink even on PARTIAL_FAILURE so the caller has a record of what
//! was reconciled").

use async_trait::async_trait;

/// What actually landed in the store during one reconcile call, handed to
/// the sink regardless of whether the run ultimately succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledChunks {
    pub added: Vec<String>,
    pub touched: Vec<String>,
    pub deleted: Vec<String>,
}

impl From<recon_engine::ReconcileOutcome> for ReconciledChunks {
    fn from(outcome: recon_engine::ReconcileOutcome) -> Self {
        Self { added: outcome.added, touched: outcome.touched, deleted: outcome.deleted }
    }
}

/// Where successfully-reconciled chunk ids are reported. An external
/// collaborator the same way `PagedDataset` and `EmbeddingProvider` are:
/// the orchestrator never assumes a concrete destination.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, chunks: ReconciledChunks);
}

/// Test/demo sink that just accumulates every emitted batch in memory.
#[derive(Default)]
pub struct InMemorySink {
    batches: tokio::sync::Mutex<Vec<ReconciledChunks>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batches(&self) -> Vec<ReconciledChunks> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl OutputSink for InMemorySink {
    async fn emit(&self, chunks: ReconciledChunks) {
        self.batches.lock().await.push(chunks);
    }
}
