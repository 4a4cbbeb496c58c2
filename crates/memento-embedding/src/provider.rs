// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Embedding provider contract and the deterministic fallback used when no
//! real provider is configured.

use async_trait::async_trait;
use memento_types::Result;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Produces a pseudo-embedding from the content hash so downstream code
/// (search, similarity ranking) stays exercisable offline and in tests.
/// Not a real semantic embedding: only useful for structural comparisons
/// of identical or near-identical content.
pub struct NullProvider {
    dimensions: usize,
}

impl NullProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn pseudo_embed(content: &str, dimensions: usize) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let digest = hasher.finalize();

        let mut values = Vec::with_capacity(dimensions);
        let mut seed = digest.to_vec();
        while values.len() < dimensions {
            for byte in &seed {
                if values.len() >= dimensions {
                    break;
                }
                // Map a byte to [-1, 1] so the vector behaves like a
                // normalized embedding rather than an all-positive one.
                values.push((*byte as f32 / 127.5) - 1.0);
            }
            // Re-hash to extend the stream past 32 bytes when dimensions > 32.
            let mut hasher = Sha256::new();
            hasher.update(&seed);
            seed = hasher.finalize().to_vec();
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for NullProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| Self::pseudo_embed(t, self.dimensions))
            .collect())
    }

    fn model_name(&self) -> &str {
        "null-pseudo-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_embed_is_deterministic() {
        let a = NullProvider::pseudo_embed("hello world", 16);
        let b = NullProvider::pseudo_embed("hello world", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn pseudo_embed_differs_for_different_content() {
        let a = NullProvider::pseudo_embed("hello", 16);
        let b = NullProvider::pseudo_embed("world", 16);
        assert_ne!(a, b);
    }

    #[test]
    fn pseudo_embed_is_normalized() {
        let v = NullProvider::pseudo_embed("some content", 32);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn embed_respects_configured_dimensions() {
        let provider = NullProvider::new(8);
        let out = provider.embed(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 8);
    }
}
