use thiserror::Error;

/// The closed error taxonomy from spec §7. Adapter-internal retries absorb
/// transient faults; anything surfacing here aborts the current phase only —
/// the Engine never retries across phases (§7 propagation rule).
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("dataset unavailable: {0}")]
    DatasetUnavailable(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("backend unreachable ({backend}): {message}")]
    BackendUnreachable { backend: String, message: String },

    #[error("backend operation '{operation}' failed on {backend} after backoff cap: {message}")]
    BackendOperationFailed {
        backend: String,
        operation: String,
        message: String,
    },

    #[error("partial failure in phase '{phase}': {operation} failed: {message}")]
    PartialFailure {
        phase: String,
        operation: String,
        message: String,
    },
}

impl ReconError {
    /// The stable kind name, used by the orchestrator's user-visible status
    /// message (spec §7: "names the failing phase and the underlying
    /// backend message").
    pub fn kind(&self) -> &'static str {
        match self {
            ReconError::ConfigInvalid(_) => "CONFIG_INVALID",
            ReconError::DatasetUnavailable(_) => "DATASET_UNAVAILABLE",
            ReconError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
            ReconError::BackendUnreachable { .. } => "BACKEND_UNREACHABLE",
            ReconError::BackendOperationFailed { .. } => "BACKEND_OPERATION_FAILED",
            ReconError::PartialFailure { .. } => "PARTIAL_FAILURE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
