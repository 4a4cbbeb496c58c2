// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Production `TaskHandler` implementations wiring the worker pool into the
//! Entity, Relationship, Embedding, and History services (spec §2 Data
//! Flow): a worker invokes the injected AST provider, then calls Entity
//! Service and Relationship Service to bulk-upsert results; each successful
//! upsert optionally enqueues an embedding task and appends a version.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memento_embedding::EmbeddingService;
use memento_entity::{BulkUpsertOptions, EntityService};
use memento_history::VersionStore;
use memento_relationship::RelationshipService;
use memento_storage::GraphStore;
use memento_types::{Entity, EntityId, MementoError, Relationship, RelationshipType, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::queue::QueueManager;
use crate::task::{TaskPayload, TaskType};
use crate::worker::TaskHandler;

const CODE_EMBEDDINGS_COLLECTION: &str = "code_embeddings";

/// Entities and relationships extracted from one unit of source (a file, a
/// module). Parsing source code itself is out of scope here (spec.md §1
/// Non-goals); deployments inject a provider over whatever parser they run.
#[derive(Debug, Clone, Default)]
pub struct ParsedUnit {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

#[async_trait]
pub trait AstProvider: Send + Sync {
    async fn parse(&self, path: &str, content: &str) -> Result<ParsedUnit>;
}

/// Returns an empty [`ParsedUnit`] for every input. Keeps the `Parse`
/// handler exercisable in tests and offline runs when no real provider is
/// configured, mirroring the embedding service's `NullProvider` fallback.
pub struct NullAstProvider;

#[async_trait]
impl AstProvider for NullAstProvider {
    async fn parse(&self, path: &str, _content: &str) -> Result<ParsedUnit> {
        tracing::debug!(path, "no AST provider configured, skipping parse");
        Ok(ParsedUnit::default())
    }
}

fn change_set_id(metadata: &Value) -> Option<String> {
    metadata.get("change_set_id").and_then(|v| v.as_str()).map(str::to_string)
}

fn enqueue_embedding_if_content(queue: &QueueManager, entity: &Entity) {
    let Some(content) = entity.metadata.get("content").and_then(|v| v.as_str()) else {
        return;
    };
    let payload = TaskPayload::new(
        TaskType::Embedding,
        5,
        serde_json::json!({ "entity_id": entity.id.as_str(), "content": content }),
    );
    if let Err(e) = queue.enqueue(payload) {
        tracing::warn!(error = %e, entity_id = %entity.id, "failed to enqueue embedding task after upsert");
    }
}

fn append_version(versions: &VersionStore, entity: &Entity, change_set: Option<String>) {
    if let Some(hash) = &entity.hash {
        versions.append(
            &entity.id,
            hash,
            entity.last_modified,
            change_set,
            entity.path.clone(),
            entity.language.clone(),
        );
    }
}

/// Handles `entity_upsert`: a pre-built entity (typically from an explicit
/// API call rather than a parse) is bulk-upserted, versioned, and queued
/// for embedding when it carries inline content.
pub struct EntityUpsertHandler {
    entities: Arc<EntityService>,
    versions: Arc<VersionStore>,
    queue: Arc<QueueManager>,
}

impl EntityUpsertHandler {
    pub fn new(entities: Arc<EntityService>, versions: Arc<VersionStore>, queue: Arc<QueueManager>) -> Self {
        Self { entities, versions, queue }
    }
}

#[async_trait]
impl TaskHandler for EntityUpsertHandler {
    async fn handle(&self, task: &TaskPayload) -> Result<()> {
        let entity: Entity = serde_json::from_value(task.data.clone())
            .map_err(|e| MementoError::InputValidation(format!("entity_upsert payload: {e}")))?;
        let change_set = change_set_id(&task.metadata);

        let upserted = self.entities.upsert_entity(entity)?;
        enqueue_embedding_if_content(&self.queue, &upserted);
        append_version(&self.versions, &upserted, change_set);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RelationshipTask {
    Upsert {
        relationship: Relationship,
    },
    Open {
        from: EntityId,
        to: EntityId,
        relationship_type: RelationshipType,
        at: DateTime<Utc>,
        #[serde(default)]
        change_set_id: Option<String>,
    },
    Close {
        from: EntityId,
        to: EntityId,
        relationship_type: RelationshipType,
        at: DateTime<Utc>,
    },
}

/// Handles `relationship_upsert`: either a direct upsert of a pre-built
/// relationship, or an explicit open/close of a temporal edge.
pub struct RelationshipUpsertHandler {
    relationships: Arc<RelationshipService>,
}

impl RelationshipUpsertHandler {
    pub fn new(relationships: Arc<RelationshipService>) -> Self {
        Self { relationships }
    }
}

#[async_trait]
impl TaskHandler for RelationshipUpsertHandler {
    async fn handle(&self, task: &TaskPayload) -> Result<()> {
        let action: RelationshipTask = serde_json::from_value(task.data.clone())
            .map_err(|e| MementoError::InputValidation(format!("relationship_upsert payload: {e}")))?;
        match action {
            RelationshipTask::Upsert { relationship } => {
                self.relationships.create_relationship(relationship)?;
            }
            RelationshipTask::Open { from, to, relationship_type, at, change_set_id } => {
                self.relationships.open_temporal_edge(&from, &to, relationship_type, at, change_set_id)?;
            }
            RelationshipTask::Close { from, to, relationship_type, at } => {
                self.relationships.close_temporal_edge(&from, &to, relationship_type, at)?;
            }
        }
        Ok(())
    }
}

/// Handles `parse`: invokes the injected [`AstProvider`] on `{path,
/// content}`, bulk-upserts the resulting entities and relationships, then
/// versions and enqueues embeddings the same way `entity_upsert` does.
pub struct ParseHandler {
    entities: Arc<EntityService>,
    relationships: Arc<RelationshipService>,
    versions: Arc<VersionStore>,
    queue: Arc<QueueManager>,
    ast_provider: Arc<dyn AstProvider>,
}

impl ParseHandler {
    pub fn new(
        entities: Arc<EntityService>,
        relationships: Arc<RelationshipService>,
        versions: Arc<VersionStore>,
        queue: Arc<QueueManager>,
        ast_provider: Arc<dyn AstProvider>,
    ) -> Self {
        Self { entities, relationships, versions, queue, ast_provider }
    }
}

#[async_trait]
impl TaskHandler for ParseHandler {
    async fn handle(&self, task: &TaskPayload) -> Result<()> {
        let path = task
            .data
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MementoError::InputValidation("parse payload missing path".to_string()))?;
        let content = task
            .data
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MementoError::InputValidation("parse payload missing content".to_string()))?;

        let parsed = self.ast_provider.parse(path, content).await?;
        let change_set = change_set_id(&task.metadata);

        let report = self
            .entities
            .create_entities_bulk(parsed.entities.clone(), BulkUpsertOptions { update_existing: true, ..Default::default() });
        if !report.failed.is_empty() {
            tracing::warn!(path, failed = report.failed.len(), "some entities failed to upsert during parse");
        }
        self.relationships.create_relationships_bulk(parsed.relationships);

        for entity in &parsed.entities {
            enqueue_embedding_if_content(&self.queue, entity);
            append_version(&self.versions, entity, change_set.clone());
        }
        Ok(())
    }
}

/// Handles `embedding`: generates an embedding for `{entity_id, content}`
/// and stores it in the graph store's vector collection backing semantic
/// search.
pub struct EmbeddingHandler {
    embeddings: Arc<EmbeddingService>,
    graph: Arc<dyn GraphStore>,
}

impl EmbeddingHandler {
    pub fn new(embeddings: Arc<EmbeddingService>, graph: Arc<dyn GraphStore>) -> Self {
        Self { embeddings, graph }
    }
}

#[async_trait]
impl TaskHandler for EmbeddingHandler {
    async fn handle(&self, task: &TaskPayload) -> Result<()> {
        let entity_id = task
            .data
            .get("entity_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MementoError::InputValidation("embedding payload missing entity_id".to_string()))?;
        let content = task
            .data
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MementoError::InputValidation("embedding payload missing content".to_string()))?;

        let generated = self
            .embeddings
            .generate_embedding(content, Some(&EntityId::from(entity_id)))
            .await?;
        self.graph
            .upsert_vector(
                CODE_EMBEDDINGS_COLLECTION,
                entity_id,
                generated.embedding,
                serde_json::json!({ "model": generated.model }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use memento_types::EntityKind;
    use serde_json::Map;

    fn file_entity(id: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            path: Some(format!("src/{id}.ts")),
            hash: Some("h1".to_string()),
            language: Some("typescript".to_string()),
            created: Utc::now(),
            last_modified: Utc::now(),
            metadata: Map::new(),
            kind: EntityKind::File {
                extension: Some("ts".into()),
                size: 10,
                lines: 1,
                is_test: false,
                is_config: false,
                dependencies: vec![],
            },
        }
    }

    #[tokio::test]
    async fn entity_upsert_handler_upserts_and_versions() {
        let entities = Arc::new(EntityService::new());
        let versions = Arc::new(VersionStore::new());
        let queue = Arc::new(QueueManager::new(QueueConfig::default()));
        let handler = EntityUpsertHandler::new(entities.clone(), versions.clone(), queue);

        let entity = file_entity("a");
        let task = TaskPayload::new(TaskType::EntityUpsert, 5, serde_json::to_value(&entity).unwrap());
        handler.handle(&task).await.unwrap();

        assert!(entities.entity_exists(&EntityId::from("a")));
        assert_eq!(versions.timeline(&EntityId::from("a"), None, None, 10).len(), 1);
    }

    #[tokio::test]
    async fn entity_upsert_handler_enqueues_embedding_when_content_present() {
        let entities = Arc::new(EntityService::new());
        let versions = Arc::new(VersionStore::new());
        let queue = Arc::new(QueueManager::new(QueueConfig::default()));
        let handler = EntityUpsertHandler::new(entities, versions, queue.clone());

        let mut entity = file_entity("a");
        entity.metadata.insert("content".to_string(), Value::String("fn main() {}".to_string()));
        let task = TaskPayload::new(TaskType::EntityUpsert, 5, serde_json::to_value(&entity).unwrap());
        handler.handle(&task).await.unwrap();

        assert_eq!(queue.dequeue_by_priority(10).len(), 1);
    }

    #[tokio::test]
    async fn relationship_upsert_handler_opens_and_closes_temporal_edge() {
        let relationships = Arc::new(RelationshipService::new());
        let handler = RelationshipUpsertHandler::new(relationships.clone());

        let opened_at = Utc::now();
        let open_task = TaskPayload::new(
            TaskType::RelationshipUpsert,
            5,
            serde_json::json!({
                "action": "open",
                "from": "a",
                "to": "b",
                "relationship_type": "MODIFIED_IN",
                "at": opened_at,
            }),
        );
        handler.handle(&open_task).await.unwrap();

        let (items, _) = relationships.list_relationships(&Default::default(), 10, 0);
        assert!(items[0].validity.as_ref().unwrap().is_open());

        let closed_at = opened_at + chrono::Duration::seconds(10);
        let close_task = TaskPayload::new(
            TaskType::RelationshipUpsert,
            5,
            serde_json::json!({
                "action": "close",
                "from": "a",
                "to": "b",
                "relationship_type": "MODIFIED_IN",
                "at": closed_at,
            }),
        );
        handler.handle(&close_task).await.unwrap();

        let (items, _) = relationships.list_relationships(&Default::default(), 10, 0);
        assert!(!items[0].validity.as_ref().unwrap().is_open());
    }

    struct StaticAstProvider;

    #[async_trait]
    impl AstProvider for StaticAstProvider {
        async fn parse(&self, path: &str, _content: &str) -> Result<ParsedUnit> {
            Ok(ParsedUnit {
                entities: vec![file_entity(path)],
                relationships: vec![],
            })
        }
    }

    #[tokio::test]
    async fn parse_handler_upserts_entities_from_ast_provider() {
        let entities = Arc::new(EntityService::new());
        let relationships = Arc::new(RelationshipService::new());
        let versions = Arc::new(VersionStore::new());
        let queue = Arc::new(QueueManager::new(QueueConfig::default()));
        let handler = ParseHandler::new(
            entities.clone(),
            relationships,
            versions.clone(),
            queue,
            Arc::new(StaticAstProvider),
        );

        let task = TaskPayload::new(
            TaskType::Parse,
            5,
            serde_json::json!({ "path": "x", "content": "source" }),
        );
        handler.handle(&task).await.unwrap();

        assert!(entities.entity_exists(&EntityId::from("x")));
        assert_eq!(versions.timeline(&EntityId::from("x"), None, None, 10).len(), 1);
    }

    #[tokio::test]
    async fn null_ast_provider_returns_empty_unit() {
        let parsed = NullAstProvider.parse("src/a.ts", "whatever").await.unwrap();
        assert!(parsed.entities.is_empty());
        assert!(parsed.relationships.is_empty());
    }

    #[tokio::test]
    async fn embedding_handler_stores_vector_in_graph() {
        use memento_embedding::EmbeddingConfig;
        use memento_storage::InMemoryGraphStore;

        let embeddings = Arc::new(EmbeddingService::new(EmbeddingConfig { dimensions: 8, ..Default::default() }));
        let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let handler = EmbeddingHandler::new(embeddings, graph.clone());

        let task = TaskPayload::new(
            TaskType::Embedding,
            5,
            serde_json::json!({ "entity_id": "a", "content": "fn main() {}" }),
        );
        handler.handle(&task).await.unwrap();

        let matches = graph
            .search_vector(CODE_EMBEDDINGS_COLLECTION, vec![0.0; 8], 10, None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }
}
