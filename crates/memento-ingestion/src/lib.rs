// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Partitioned task queue and worker pool backing Memento's ingestion
//! pipeline.

pub mod handlers;
pub mod queue;
pub mod task;
pub mod worker;

pub use handlers::{
    AstProvider, EmbeddingHandler, EntityUpsertHandler, NullAstProvider, ParseHandler, ParsedUnit,
    RelationshipUpsertHandler,
};
pub use queue::{PartitionStrategy, QueueConfig, QueueManager, QueueMetrics};
pub use task::{TaskPayload, TaskType};
pub use worker::{ScalingRules, TaskHandler, WorkerHealth, WorkerPool, WorkerPoolConfig};
