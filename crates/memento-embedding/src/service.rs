// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The embedding service: batching, content-hash caching, cost accounting,
//! and retry with exponential backoff around a pluggable provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use memento_types::{EntityId, MementoError, Result};
use sha2::{Digest, Sha256};

use crate::cost::CostTable;
use crate::provider::{EmbeddingProvider, NullProvider};

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "null-pseudo-embedding".to_string(),
            dimensions: 256,
            batch_size: 64,
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            rate_limit_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct GeneratedEmbedding {
    pub embedding: Vec<f32>,
    pub content: String,
    pub model: String,
    pub usage: EmbeddingUsage,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub results: Vec<GeneratedEmbedding>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub processing_time: Duration,
}

fn estimate_tokens(content: &str) -> u64 {
    // Rough heuristic consistent across providers: ~4 chars/token.
    ((content.len() as u64) / 4).max(1)
}

fn cache_key(model: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    format!("{model}:{digest:x}")
}

pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
    cost_table: CostTable,
    cache: DashMap<String, Vec<f32>>,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(NullProvider::new(config.dimensions));
        Self {
            provider,
            config,
            cost_table: CostTable::default(),
            cache: DashMap::new(),
        }
    }

    pub fn with_provider(config: EmbeddingConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            config,
            cost_table: CostTable::default(),
            cache: DashMap::new(),
        }
    }

    pub async fn generate_embedding(
        &self,
        content: &str,
        _entity_id: Option<&EntityId>,
    ) -> Result<GeneratedEmbedding> {
        let key = cache_key(&self.config.model, content);
        if let Some(cached) = self.cache.get(&key) {
            let tokens = estimate_tokens(content);
            return Ok(GeneratedEmbedding {
                embedding: cached.clone(),
                content: content.to_string(),
                model: self.config.model.clone(),
                usage: EmbeddingUsage {
                    prompt_tokens: tokens,
                    total_tokens: tokens,
                },
            });
        }

        let embedding = self.embed_with_retry(&[content.to_string()]).await?.remove(0);
        self.cache.insert(key, embedding.clone());

        let tokens = estimate_tokens(content);
        Ok(GeneratedEmbedding {
            embedding,
            content: content.to_string(),
            model: self.config.model.clone(),
            usage: EmbeddingUsage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        })
    }

    pub async fn generate_embeddings_batch(&self, inputs: &[String]) -> Result<BatchResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(inputs.len());
        let mut total_tokens: u64 = 0;

        for (i, chunk) in inputs.chunks(self.config.batch_size.max(1)).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.rate_limit_delay).await;
            }

            let mut to_fetch = Vec::new();
            let mut cached_embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunk.len());
            for content in chunk {
                let key = cache_key(&self.config.model, content);
                if let Some(cached) = self.cache.get(&key) {
                    cached_embeddings.push(Some(cached.clone()));
                } else {
                    cached_embeddings.push(None);
                    to_fetch.push(content.clone());
                }
            }

            let fetched = if to_fetch.is_empty() {
                Vec::new()
            } else {
                self.embed_with_retry(&to_fetch).await?
            };
            let mut fetched_iter = fetched.into_iter();

            for (content, cached) in chunk.iter().zip(cached_embeddings.into_iter()) {
                let embedding = match cached {
                    Some(v) => v,
                    None => {
                        let v = fetched_iter.next().ok_or_else(|| {
                            MementoError::Internal("embedding provider returned too few results".into())
                        })?;
                        self.cache.insert(cache_key(&self.config.model, content), v.clone());
                        v
                    }
                };
                let tokens = estimate_tokens(content);
                total_tokens += tokens;
                results.push(GeneratedEmbedding {
                    embedding,
                    content: content.clone(),
                    model: self.config.model.clone(),
                    usage: EmbeddingUsage {
                        prompt_tokens: tokens,
                        total_tokens: tokens,
                    },
                });
            }
        }

        let total_cost = self.cost_table.cost(&self.config.model, total_tokens);
        Ok(BatchResult {
            results,
            total_tokens,
            total_cost,
            processing_time: start.elapsed(),
        })
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.provider.embed(texts).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay * 2u32.pow(attempt);
                    tracing::warn!(attempt, error = %e, "embedding provider call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
