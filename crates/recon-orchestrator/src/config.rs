//! Configuration schema (spec §6): one `Config` field per recognised option,
//! loaded from TOML the way the teacher's own CLI app reads its settings.

use std::collections::BTreeMap;

use recon_core::{MetadataMap, ReconError};
use serde::Deserialize;

/// Top-level configuration, one field per row of the spec §6 config table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub dataset_id: String,
    #[serde(default)]
    pub dataset_fields: Vec<String>,
    #[serde(default)]
    pub metadata_object: MetadataMap,
    #[serde(default)]
    pub metadata_dataset_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub data_updates_primary_dataset_fields: Vec<String>,
    #[serde(default)]
    pub data_updates_strategy: DataUpdatesStrategy,

    #[serde(default)]
    pub perform_chunking: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,

    pub embeddings_provider: EmbeddingsProviderConfig,
    #[serde(default)]
    pub embeddings_api_key: String,
    #[serde(default)]
    pub embeddings_config: EmbeddingsConfig,

    #[serde(default)]
    pub delete_expired_objects: bool,
    #[serde(default)]
    pub expired_object_deletion_period_days: u32,

    pub vector_store: BackendConfig,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_worker_pool_size() -> usize {
    recon_engine::DEFAULT_WORKER_POOL_SIZE
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DataUpdatesStrategy {
    #[default]
    DeltaUpdates,
    Add,
    Upsert,
}

impl From<DataUpdatesStrategy> for recon_engine::Strategy {
    fn from(strategy: DataUpdatesStrategy) -> Self {
        match strategy {
            DataUpdatesStrategy::DeltaUpdates => recon_engine::Strategy::Delta,
            DataUpdatesStrategy::Add => recon_engine::Strategy::Append,
            DataUpdatesStrategy::Upsert => recon_engine::Strategy::Upsert,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingsProviderConfig {
    OpenAi,
    Cohere,
    Fake,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
}

fn default_dimension() -> usize {
    1536
}

fn default_embedding_batch_size() -> usize {
    100
}

/// Backend selection (spec §6: "Backend selection is a configuration
/// field"), one variant per supported store. Closed variant set: an
/// unrecognised `backend` tag fails deserialization rather than silently
/// falling through to a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BackendConfig {
    #[serde(rename = "chroma")]
    Chroma {
        base_url: String,
        collection_id: String,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "milvus")]
    Milvus {
        base_url: String,
        collection_name: String,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "opensearch")]
    OpenSearch {
        base_url: String,
        index: String,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "pgvector")]
    PgVector {
        connection_string: String,
        table: String,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "pinecone")]
    Pinecone {
        index_host: String,
        #[serde(default)]
        namespace: Option<String>,
        dummy_vector_dimension: usize,
        #[serde(default)]
        use_pinecone_id_prefix: bool,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "qdrant")]
    Qdrant {
        base_url: String,
        collection: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "weaviate")]
    Weaviate {
        base_url: String,
        class_name: String,
        #[serde(default)]
        batch_size: Option<usize>,
    },
}

impl Config {
    /// CONFIG_INVALID (spec §7): missing dataset id, unsupported strategy,
    /// contradictory chunking parameters.
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.dataset_id.trim().is_empty() {
            return Err(ReconError::ConfigInvalid("datasetId is required".to_string()));
        }
        if self.perform_chunking && self.chunk_overlap >= self.chunk_size {
            return Err(ReconError::ConfigInvalid(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.delete_expired_objects && self.expired_object_deletion_period_days == 0 {
            return Err(ReconError::ConfigInvalid(
                "expiredObjectDeletionPeriodDays must be positive when deleteExpiredObjects is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Expiry cutoff in epoch seconds, or `None` when expiry is disabled
    /// (spec §6: "0 disables").
    pub fn expiry_cutoff(&self, now_ts: i64) -> Option<i64> {
        if !self.delete_expired_objects || self.expired_object_deletion_period_days == 0 {
            return None;
        }
        let period_seconds = i64::from(self.expired_object_deletion_period_days) * 24 * 60 * 60;
        Some(now_ts - period_seconds)
    }
}
