use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::EmbeddingProvider;

const DEFAULT_ENDPOINT: &str = "https://api.cohere.ai/v1/embed";

/// Cohere `embed` API provider (spec §6 `embeddingsProvider`).
pub struct CohereProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    input_type: String,
    dimension: usize,
}

impl CohereProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            input_type: "search_document".to_string(),
            dimension,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = input_type.into();
        self
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "texts": texts,
                "input_type": self.input_type,
            }))
            .send()
            .await
            .context("Cohere embed request failed to send")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Cohere embed request failed ({status}): {body}"));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("Cohere embed response was not valid JSON")?;

        if parsed.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Cohere returned {} embeddings for {} texts",
                parsed.embeddings.len(),
                texts.len()
            ));
        }
        Ok(parsed.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
