//! Backend construction (spec §4.5, §6): turns a `BackendConfig` variant
//! into the matching concrete adapter behind `Arc<dyn VectorStoreAdapter>`.
//! Unsupported backends never reach this point — `BackendConfig` is a
//! closed tagged enum, so an unrecognised `backend` value fails
//! deserialization instead of falling through here (spec §6: "implementations
//! for unsupported backends refuse to start").

use std::sync::Arc;

use recon_core::ReconError;
use recon_store::{
    ChromaAdapter, MilvusAdapter, OpenSearchAdapter, PgVectorAdapter, PineconeAdapter, QdrantAdapter,
    VectorStoreAdapter, WeaviateAdapter,
};

use crate::config::BackendConfig;

pub async fn build_store(config: &BackendConfig) -> Result<Arc<dyn VectorStoreAdapter>, ReconError> {
    let adapter: Arc<dyn VectorStoreAdapter> = match config {
        BackendConfig::Chroma { base_url, collection_id, batch_size } => {
            let mut adapter = ChromaAdapter::new(base_url, collection_id);
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
        BackendConfig::Milvus { base_url, collection_name, batch_size } => {
            let mut adapter = MilvusAdapter::new(base_url, collection_name);
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
        BackendConfig::OpenSearch { base_url, index, batch_size } => {
            let mut adapter = OpenSearchAdapter::new(base_url, index);
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
        BackendConfig::PgVector { connection_string, table, batch_size } => {
            let (client, connection) = tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|error| ReconError::BackendUnreachable {
                    backend: "pgvector".to_string(),
                    message: error.to_string(),
                })?;
            tokio::spawn(async move {
                if let Err(error) = connection.await {
                    tracing::warn!(error = %error, "pgvector connection closed");
                }
            });
            let mut adapter = PgVectorAdapter::new(client, table);
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
        BackendConfig::Pinecone {
            index_host,
            namespace,
            dummy_vector_dimension,
            use_pinecone_id_prefix,
            batch_size,
        } => {
            let dummy_vector = vec![0.0_f32; *dummy_vector_dimension];
            let mut adapter = PineconeAdapter::new(index_host, namespace.clone(), dummy_vector)
                .with_id_prefix(*use_pinecone_id_prefix);
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
        BackendConfig::Qdrant { base_url, collection, api_key, batch_size } => {
            let mut adapter = QdrantAdapter::new(base_url, collection, api_key.clone());
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
        BackendConfig::Weaviate { base_url, class_name, batch_size } => {
            let mut adapter = WeaviateAdapter::new(base_url, class_name);
            if let Some(batch_size) = batch_size {
                adapter = adapter.with_batch_size(*batch_size);
            }
            Arc::new(adapter)
        }
    };
    Ok(adapter)
}
