//! Embedding provider construction (spec §6: `embeddingsProvider`,
//! `embeddingsApiKey`, `embeddingsConfig`).

use recon_core::ReconError;
use recon_embedding::{CohereProvider, EmbeddingProvider, FakeEmbeddingProvider, OpenAiProvider};

use crate::config::{EmbeddingsConfig, EmbeddingsProviderConfig};

pub fn build_provider(
    provider: &EmbeddingsProviderConfig,
    api_key: &str,
    config: &EmbeddingsConfig,
) -> Result<Box<dyn EmbeddingProvider>, ReconError> {
    match provider {
        EmbeddingsProviderConfig::OpenAi => {
            if api_key.is_empty() {
                return Err(ReconError::ConfigInvalid("embeddingsApiKey is required for openai".to_string()));
            }
            Ok(Box::new(OpenAiProvider::new(api_key, config.model.clone(), config.dimension)))
        }
        EmbeddingsProviderConfig::Cohere => {
            if api_key.is_empty() {
                return Err(ReconError::ConfigInvalid("embeddingsApiKey is required for cohere".to_string()));
            }
            Ok(Box::new(CohereProvider::new(api_key, config.model.clone(), config.dimension)))
        }
        EmbeddingsProviderConfig::Fake => Ok(Box::new(FakeEmbeddingProvider::new(config.dimension))),
    }
}
