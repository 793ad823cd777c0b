use async_trait::async_trait;
use recon_core::digest;

use crate::EmbeddingProvider;

/// Deterministic embedding provider for tests (spec §6). Derives a
/// fixed-width vector from `blake3::hash(text)` so the same text always
/// embeds to the same vector without a network round trip.
pub struct FakeEmbeddingProvider {
    dimension: usize,
}

impl FakeEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let hash = digest(text);
        let bytes = hash.as_bytes();
        (0..self.dimension)
            .map(|i| {
                let byte = bytes[i % bytes.len()];
                (byte as f32 / 255.0) * 2.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn given_same_text_when_embedding_twice_then_vectors_are_identical() {
        let provider = FakeEmbeddingProvider::new(16);
        let a = provider.embed(&["hello world".to_string()]).await.unwrap();
        let b = provider.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 16);
    }

    #[tokio::test]
    async fn given_different_text_when_embedding_then_vectors_differ() {
        let provider = FakeEmbeddingProvider::new(16);
        let a = provider.embed_one("alpha");
        let b = provider.embed_one("beta");
        assert_ne!(a, b);
    }
}
