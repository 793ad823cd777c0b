use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::EmbeddingProvider;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// OpenAI `embeddings` API provider (spec §6 `embeddingsProvider`).
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Override the request endpoint, e.g. against a recorded fixture server
    /// in tests.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await
            .context("OpenAI embeddings request failed to send")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI embeddings request failed ({status}): {body}"));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .context("OpenAI embeddings response was not valid JSON")?;

        let mut vectors = vec![Vec::new(); parsed.data.len()];
        for datum in parsed.data {
            if datum.index >= vectors.len() {
                return Err(anyhow!("OpenAI response index {} out of bounds", datum.index));
            }
            vectors[datum.index] = datum.embedding;
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
