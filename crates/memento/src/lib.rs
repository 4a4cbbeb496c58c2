// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Memento: a temporal code-knowledge-graph engine. This crate is the
//! facade that wires the `memento-*` service crates together behind a
//! single handle and loads configuration for them.

pub mod config;

use std::sync::Arc;

use memento_embedding::{EmbeddingConfig, EmbeddingService};
use memento_entity::EntityService;
use memento_history::{CheckpointStore, VersionStore};
use memento_ingestion::{
    AstProvider, EmbeddingHandler, EntityUpsertHandler, NullAstProvider, ParseHandler, QueueConfig, QueueManager,
    RelationshipUpsertHandler, TaskType, WorkerPool, WorkerPoolConfig,
};
use memento_relationship::RelationshipService;
use memento_search::SearchService;
use memento_session::SessionManager;
use memento_session_jobs::{SessionJobRunner, SessionJobStore};
use memento_storage::{GraphStore, InMemoryGraphStore, InMemoryKvStore, InMemoryRelationalStore, KvStore, RelationalStore};

pub use config::MementoConfig;

/// Initializes a `tracing` subscriber reading `RUST_LOG` (falling back to
/// `info`).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// The assembled set of storage adapters a [`MementoGraph`] runs against.
/// Defaults to the dependency-free in-memory fakes; swap in the
/// feature-gated production adapters (`Neo4jGraphStore`,
/// `PostgresRelationalStore`, `RedisKvStore`) for a real deployment.
pub struct MementoStores {
    pub graph: Arc<dyn GraphStore>,
    pub relational: Arc<dyn RelationalStore>,
    pub kv: Arc<dyn KvStore>,
    /// Parses source into entities/relationships for the ingestion
    /// pipeline's `parse` task. Defaults to a no-op provider; deployments
    /// inject their own (parsing source code itself is out of scope here).
    pub ast_provider: Arc<dyn AstProvider>,
}

impl Default for MementoStores {
    fn default() -> Self {
        Self {
            graph: Arc::new(InMemoryGraphStore::new()),
            relational: Arc::new(InMemoryRelationalStore::default()),
            kv: Arc::new(InMemoryKvStore::default()),
            ast_provider: Arc::new(NullAstProvider),
        }
    }
}

/// The top-level Memento handle: every service crate wired together over
/// a shared set of storage adapters and a [`MementoConfig`].
pub struct MementoGraph {
    pub config: MementoConfig,
    pub entities: Arc<EntityService>,
    pub relationships: Arc<RelationshipService>,
    pub versions: Arc<VersionStore>,
    pub checkpoints: Arc<CheckpointStore>,
    pub embeddings: Arc<EmbeddingService>,
    pub search: Arc<SearchService>,
    pub queue: Arc<QueueManager>,
    pub workers: Arc<WorkerPool>,
    pub sessions: Arc<SessionManager>,
    pub session_jobs: Arc<SessionJobStore>,
    pub session_job_runner: Arc<SessionJobRunner>,
    pub stores: MementoStores,
}

impl MementoGraph {
    /// Wires every service crate together from `config` and `stores`.
    /// Does not start any background draining; call
    /// [`MementoGraph::reconcile_on_boot`] and then drive
    /// `session_job_runner.drain_once` / a `WorkerPool` loop from the
    /// embedding caller.
    pub fn new(config: MementoConfig, stores: MementoStores) -> Self {
        let entities = Arc::new(EntityService::new());
        let relationships = Arc::new(RelationshipService::new());
        let versions = Arc::new(VersionStore::new());
        let checkpoints = Arc::new(CheckpointStore::new());

        let embedding_config = EmbeddingConfig {
            model: config.embedding.model.clone(),
            dimensions: config.embedding.dimensions,
            batch_size: config.embedding.batch_size,
            ..EmbeddingConfig::default()
        };
        let embeddings = Arc::new(EmbeddingService::new(embedding_config));
        let search = Arc::new(SearchService::new(
            entities.clone(),
            relationships.clone(),
            stores.graph.clone(),
            embeddings.clone(),
        ));

        let queue_config = QueueConfig {
            partitions: config.queue.partition_count,
            max_size_per_partition: config.queue.max_size,
            backpressure_threshold: config.queue.backpressure_threshold,
            ..QueueConfig::default()
        };
        let queue = Arc::new(QueueManager::new(queue_config));

        let worker_config = WorkerPoolConfig {
            min_workers: config.workers.min,
            max_workers: config.workers.max,
            worker_timeout: config.workers.timeout,
            auto_scale: config.auto_scale.enabled,
            ..WorkerPoolConfig::default()
        };
        let workers = Arc::new(WorkerPool::new(worker_config));
        workers.register_handler(
            TaskType::EntityUpsert,
            Arc::new(EntityUpsertHandler::new(entities.clone(), versions.clone(), queue.clone())),
        );
        workers.register_handler(
            TaskType::RelationshipUpsert,
            Arc::new(RelationshipUpsertHandler::new(relationships.clone())),
        );
        workers.register_handler(
            TaskType::Parse,
            Arc::new(ParseHandler::new(
                entities.clone(),
                relationships.clone(),
                versions.clone(),
                queue.clone(),
                stores.ast_provider.clone(),
            )),
        );
        workers.register_handler(
            TaskType::Embedding,
            Arc::new(EmbeddingHandler::new(embeddings.clone(), stores.graph.clone())),
        );

        let sessions = Arc::new(SessionManager::new(stores.kv.clone(), config.session.default_ttl));
        let session_jobs = Arc::new(SessionJobStore::new(stores.relational.clone(), 5));
        let session_job_runner = Arc::new(SessionJobRunner::new(
            session_jobs.clone(),
            checkpoints.clone(),
            entities.clone(),
            relationships.clone(),
            sessions.clone(),
        ));

        Self {
            config,
            entities,
            relationships,
            versions,
            checkpoints,
            embeddings,
            search,
            queue,
            workers,
            sessions,
            session_jobs,
            session_job_runner,
            stores,
        }
    }

    /// Runs durable-store schema setup and requeues orphaned session jobs.
    /// Call once, before accepting traffic.
    pub async fn reconcile_on_boot(&self) -> memento_types::Result<usize> {
        self.session_jobs.initialize().await?;
        self.session_job_runner.reconcile_on_boot().await
    }

    /// Runs the temporal history validator across every entity (spec
    /// §4.11), optionally repairing `missing_previous` links.
    pub fn validate_history(&self, options: memento_validator::ValidateOptions) -> memento_types::Result<memento_validator::ValidateReport> {
        memento_validator::validate(&self.entities, &self.versions, options)
    }
}
