// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Embedding provider abstraction, deterministic fallback, batching,
//! content-hash caching, and cost accounting for Memento.

pub mod cost;
pub mod provider;
pub mod service;

pub use cost::CostTable;
pub use provider::{EmbeddingProvider, NullProvider};
pub use service::{
    BatchResult, EmbeddingConfig, EmbeddingService, EmbeddingUsage, GeneratedEmbedding,
};
