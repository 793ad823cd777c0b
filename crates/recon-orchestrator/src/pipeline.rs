//! End-to-end pipeline wiring (spec §2 item 8): dataset → documents → chunk
//! → stamp → embed → reconcile → expire, with phased tracing spans matching
//! the ambient logging design (spec §6 "Ambient stack").

use std::sync::Arc;

use recon_chunking::{chunk_document, now_utc_epoch_seconds, stamp_chunk, stamp_item, RecursiveCharacterTextSplitter};
use recon_core::{Chunk, ReconError};
use recon_dataset::{read_documents, DatasetReaderConfig};
use recon_embedding::{embed_in_batches, EmbeddingProvider};
use recon_store::VectorStoreAdapter;
use tracing::Instrument;

use crate::config::Config;
use crate::sink::{OutputSink, ReconciledChunks};

/// Summary of one pipeline run, for the CLI's exit-status mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub documents_read: usize,
    pub chunks_considered: usize,
    pub outcome: ReconciledChunks,
    pub expired: bool,
}

/// A terminal pipeline error, naming the phase it occurred in (spec §7:
/// "Orchestrator maps terminal errors to a user-visible status message that
/// names the failing phase and the underlying backend message").
#[derive(Debug)]
pub struct PipelineError {
    pub phase: &'static str,
    pub source: ReconError,
}

impl PipelineError {
    fn new(phase: &'static str, source: ReconError) -> Self {
        Self { phase, source }
    }

    pub fn user_message(&self) -> String {
        format!("{} phase failed ({}): {}", self.phase, self.source.kind(), self.source)
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub async fn run(
    config: &Config,
    dataset: &dyn recon_dataset::PagedDataset,
    embedding_provider: &dyn EmbeddingProvider,
    store: Arc<dyn VectorStoreAdapter>,
    sink: &dyn OutputSink,
) -> Result<RunReport, PipelineError> {
    config.validate().map_err(|error| PipelineError::new("config", error))?;

    let dataset_config = DatasetReaderConfig {
        dataset_id: config.dataset_id.clone(),
        dataset_fields: config.dataset_fields.clone(),
        metadata_object: config.metadata_object.clone(),
        metadata_dataset_fields: config.metadata_dataset_fields.clone(),
    };

    let mut documents = read_documents(dataset, &dataset_config)
        .instrument(tracing::info_span!("dataset"))
        .await
        .map_err(|error| PipelineError::new("dataset", error))?;
    let documents_read = documents.len();

    let now_ts = now_utc_epoch_seconds();
    for document in &mut documents {
        stamp_item(document, &config.data_updates_primary_dataset_fields, now_ts);
    }

    let chunks = {
        let _enter = tracing::info_span!("chunk").entered();
        build_chunks(config, &documents).map_err(|error| PipelineError::new("chunk", error))?
    };
    let chunks_considered = chunks.len();

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.page_content.clone()).collect();
    let vectors = embed_in_batches(embedding_provider, &texts, config.embeddings_config.embedding_batch_size)
        .instrument(tracing::info_span!("embed"))
        .await
        .map_err(|error| PipelineError::new("embed", error))?;

    let strategy = config.data_updates_strategy.clone().into();
    let outcome = recon_engine::reconcile_with_worker_pool(&store, &chunks, &vectors, strategy, config.worker_pool_size)
        .instrument(tracing::info_span!("reconcile"))
        .await;

    let (outcome, reconcile_error) = match outcome {
        Ok(outcome) => (outcome, None),
        Err(error) => (error.partial.clone(), Some(error)),
    };

    sink.emit(outcome.clone().into()).await;

    if let Some(error) = reconcile_error {
        return Err(PipelineError::new("reconcile", error.source));
    }

    let mut report = RunReport {
        documents_read,
        chunks_considered,
        outcome: outcome.into(),
        expired: false,
    };

    if let Some(cutoff) = config.expiry_cutoff(now_ts) {
        recon_engine::expire(&store, cutoff)
            .instrument(tracing::info_span!("expire"))
            .await
            .map_err(|error| PipelineError::new("expire", error))?;
        report.expired = true;
    }

    Ok(report)
}

fn build_chunks(config: &Config, documents: &[recon_core::Document]) -> Result<Vec<Chunk>, ReconError> {
    let splitter = if config.perform_chunking {
        Some(
            RecursiveCharacterTextSplitter::new(config.chunk_size, config.chunk_overlap)
                .map_err(ReconError::ConfigInvalid)?,
        )
    } else {
        None
    };

    let mut chunks = Vec::new();
    for document in documents {
        for mut chunk in chunk_document(document, splitter.as_ref()) {
            stamp_chunk(&mut chunk);
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}
