//! Embedding Adapter (spec §6): batched text→vector translation. The
//! Engine treats this as an external collaborator behind a narrow trait,
//! the same way `recon-dataset::PagedDataset` wraps the crawler.

use async_trait::async_trait;
use recon_core::{ReconError, Result as ReconResult};

pub mod cohere;
pub mod fake;
pub mod openai;

pub use cohere::CohereProvider;
pub use fake::FakeEmbeddingProvider;
pub use openai::OpenAiProvider;

/// `embed(texts) -> seq<vector<float32>>` plus `dimension() -> int` (spec
/// §6). Implementations own their HTTP client and do their own batching if
/// the upstream API has a request-size limit; `embed_in_batches` below
/// handles the orchestrator-level `embeddingBatchSize` config knob.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Vector width this provider produces. Used to catch a misconfigured
    /// target index before any writes happen.
    fn dimension(&self) -> usize;
}

/// Split `texts` into chunks of at most `batch_size` and embed each chunk
/// in turn, preserving input order in the concatenated result.
/// `embeddingsConfig` / `embeddingBatchSize` (spec §6).
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> ReconResult<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batch_size.max(1);

    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let embedded = provider
            .embed(batch)
            .await
            .map_err(|e| ReconError::EmbeddingFailed(e.to_string()))?;

        if embedded.len() != batch.len() {
            return Err(ReconError::EmbeddingFailed(format!(
                "provider returned {} vectors for a batch of {} texts",
                embedded.len(),
                batch.len()
            )));
        }
        validate_dimensions(&embedded, provider.dimension())?;
        vectors.extend(embedded);
    }
    Ok(vectors)
}

/// EMBEDDING_FAILED on a dimension mismatch against the provider's declared
/// width — the spec §7 error kind that covers "provider error or dimension
/// mismatch with the target index".
fn validate_dimensions(vectors: &[Vec<f32>], expected_dimension: usize) -> ReconResult<()> {
    for vector in vectors {
        if vector.len() != expected_dimension {
            return Err(ReconError::EmbeddingFailed(format!(
                "expected {expected_dimension}-dimensional vector, got {}",
                vector.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::FakeEmbeddingProvider;

    #[tokio::test]
    async fn given_empty_text_list_when_embedding_in_batches_then_returns_empty() {
        let provider = FakeEmbeddingProvider::new(8);
        let result = embed_in_batches(&provider, &[], 4).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn given_more_texts_than_batch_size_when_embedding_then_order_is_preserved() {
        let provider = FakeEmbeddingProvider::new(8);
        let texts: Vec<String> = (0..7).map(|i| format!("text-{i}")).collect();

        let vectors = embed_in_batches(&provider, &texts, 3).await.unwrap();
        assert_eq!(vectors.len(), 7);
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(*vector, provider.embed_one(text));
        }
    }

    struct MismatchedProvider;

    #[async_trait]
    impl EmbeddingProvider for MismatchedProvider {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0_f32; 3]).collect())
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn given_provider_dimension_mismatch_when_embedding_then_reports_embedding_failed() {
        let texts = vec!["a".to_string()];
        let err = embed_in_batches(&MismatchedProvider, &texts, 10).await.unwrap_err();
        assert_eq!(err.kind(), "EMBEDDING_FAILED");
    }
}
