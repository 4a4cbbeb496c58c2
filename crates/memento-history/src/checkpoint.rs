// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Checkpoint creation, listing, export/import (spec §4.6.4). A checkpoint
//! anchors a BFS-reachable set of entities at a point in time.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use memento_entity::EntityService;
use memento_relationship::RelationshipService;
use memento_types::{CheckpointId, CheckpointReason, EntityId, MementoError, Result};
use uuid::Uuid;

/// An edge with no validity window always passes; one with a window must
/// overlap `window` (when given).
fn validity_overlaps_window(
    validity: Option<&memento_types::TemporalValidity>,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> bool {
    let Some((from, to)) = window else {
        return true;
    };
    let Some(validity) = validity else {
        return true;
    };
    validity.valid_from < to && validity.valid_to.map(|valid_to| valid_to > from).unwrap_or(true)
}

#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub id: CheckpointId,
    pub timestamp: DateTime<Utc>,
    pub reason: CheckpointReason,
    pub seed_entities: Vec<EntityId>,
    pub hops: u32,
    pub description: Option<String>,
    pub members: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub struct CheckpointExport {
    pub checkpoint: CheckpointRecord,
    pub entities: Vec<memento_types::Entity>,
    pub relationships: Vec<memento_types::Relationship>,
}

#[derive(Default)]
pub struct CheckpointStore {
    checkpoints: DashMap<CheckpointId, CheckpointRecord>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// BFS from `seed_entities` over structural + code edges, up to `hops`,
    /// optionally restricted to edges whose validity window overlaps
    /// `window` (spec.md:168).
    pub fn create_checkpoint(
        &self,
        entities: &EntityService,
        relationships: &RelationshipService,
        seed_entities: Vec<EntityId>,
        reason: CheckpointReason,
        hops: u32,
        description: Option<String>,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<CheckpointRecord> {
        let mut visited: HashSet<EntityId> = seed_entities.iter().cloned().collect();
        let mut frontier: VecDeque<(EntityId, u32)> =
            seed_entities.iter().map(|e| (e.clone(), 0)).collect();

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= hops {
                continue;
            }
            let (neighbors, _) = relationships.list_relationships(
                &memento_relationship::RelationshipFilter {
                    from_entity: Some(current.clone()),
                    ..Default::default()
                },
                usize::MAX,
                0,
            );
            for edge in neighbors {
                if !edge.relationship_type.is_structural_or_code() {
                    continue;
                }
                if !validity_overlaps_window(edge.validity.as_ref(), window) {
                    continue;
                }
                if visited.insert(edge.to_entity_id.clone()) {
                    frontier.push_back((edge.to_entity_id, depth + 1));
                }
            }
        }

        let members: Vec<EntityId> = visited
            .into_iter()
            .filter(|id| entities.entity_exists(id))
            .collect();

        let record = CheckpointRecord {
            id: CheckpointId::new(Uuid::new_v4().to_string()),
            timestamp: Utc::now(),
            reason,
            seed_entities,
            hops,
            description,
            members,
        };
        self.checkpoints.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn get_checkpoint(&self, id: &CheckpointId) -> Result<CheckpointRecord> {
        self.checkpoints
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| MementoError::NotFound(format!("checkpoint {id}")))
    }

    pub fn list_checkpoints(
        &self,
        reason: Option<CheckpointReason>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
        offset: usize,
    ) -> Vec<CheckpointRecord> {
        let mut matched: Vec<CheckpointRecord> = self
            .checkpoints
            .iter()
            .map(|c| c.clone())
            .filter(|c| reason.map(|r| c.reason == r).unwrap_or(true))
            .filter(|c| since.map(|s| c.timestamp >= s).unwrap_or(true))
            .filter(|c| until.map(|u| c.timestamp <= u).unwrap_or(true))
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let end = (offset + limit.max(1)).min(matched.len());
        if offset < matched.len() {
            matched[offset..end].to_vec()
        } else {
            Vec::new()
        }
    }

    pub fn get_checkpoint_members(&self, id: &CheckpointId) -> Result<Vec<EntityId>> {
        Ok(self.get_checkpoint(id)?.members)
    }

    pub fn delete_checkpoint(&self, id: &CheckpointId) -> Result<()> {
        self.checkpoints
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MementoError::NotFound(format!("checkpoint {id}")))
    }

    pub fn export_checkpoint(
        &self,
        id: &CheckpointId,
        entities: &EntityService,
        relationships: &RelationshipService,
        include_relationships: bool,
    ) -> Result<CheckpointExport> {
        let checkpoint = self.get_checkpoint(id)?;
        let exported_entities: Vec<memento_types::Entity> = checkpoint
            .members
            .iter()
            .filter_map(|id| entities.get_entity(id).ok())
            .collect();

        let exported_relationships = if include_relationships {
            checkpoint
                .members
                .iter()
                .flat_map(|id| {
                    relationships
                        .list_relationships(
                            &memento_relationship::RelationshipFilter {
                                from_entity: Some(id.clone()),
                                ..Default::default()
                            },
                            usize::MAX,
                            0,
                        )
                        .0
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(CheckpointExport {
            checkpoint,
            entities: exported_entities,
            relationships: exported_relationships,
        })
    }

    /// Imports entities first, then relationships, per group. Dangling
    /// relationship endpoints are skipped and not counted as an error.
    pub fn import_checkpoint(
        &self,
        entities: &EntityService,
        relationships: &RelationshipService,
        export: CheckpointExport,
        use_original_id: bool,
    ) -> Result<CheckpointId> {
        for entity in export.entities {
            let _ = entities.upsert_entity(entity);
        }

        let mut skipped_dangling = 0usize;
        for relationship in export.relationships {
            if !entities.entity_exists(&relationship.from_entity_id)
                || !entities.entity_exists(&relationship.to_entity_id)
            {
                skipped_dangling += 1;
                continue;
            }
            let _ = relationships.create_relationship(relationship);
        }
        if skipped_dangling > 0 {
            tracing::warn!(skipped_dangling, "skipped relationships with dangling endpoints during checkpoint import");
        }

        let checkpoint_id = if use_original_id {
            export.checkpoint.id
        } else {
            memento_types::CheckpointId::new(Uuid::new_v4().to_string())
        };
        let mut record = export.checkpoint;
        record.id = checkpoint_id.clone();
        self.checkpoints.insert(checkpoint_id.clone(), record);
        Ok(checkpoint_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memento_types::{Entity, EntityKind, Relationship, RelationshipId, RelationshipType};
    use serde_json::Map;

    fn edge(from: &str, to: &str, relationship_type: RelationshipType) -> Relationship {
        Relationship {
            id: RelationshipId::new(Uuid::new_v4().to_string()),
            from_entity_id: EntityId::from(from),
            to_entity_id: EntityId::from(to),
            relationship_type,
            created: Utc::now(),
            last_modified: Utc::now(),
            version: 1,
            metadata: Map::new(),
            validity: None,
        }
    }

    fn sample_entity(id: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            path: None,
            hash: None,
            language: None,
            created: Utc::now(),
            last_modified: Utc::now(),
            metadata: Map::new(),
            kind: EntityKind::Module {
                exports: vec![],
                imports: vec![],
                dependencies: vec![],
                is_entry_point: false,
            },
        }
    }

    #[test]
    fn create_checkpoint_includes_bfs_reachable_members() {
        let entities = EntityService::new();
        let relationships = RelationshipService::new();
        entities.create_entity(sample_entity("a")).unwrap();
        entities.create_entity(sample_entity("b")).unwrap();
        entities.create_entity(sample_entity("c")).unwrap();
        relationships
            .create_relationship(edge("a", "b", RelationshipType::Contains))
            .unwrap();
        relationships
            .open_temporal_edge(&EntityId::from("a"), &EntityId::from("c"), RelationshipType::ModifiedIn, Utc::now(), None)
            .unwrap();

        let store = CheckpointStore::new();
        let checkpoint = store
            .create_checkpoint(
                &entities,
                &relationships,
                vec![EntityId::from("a")],
                CheckpointReason::Manual,
                2,
                None,
                None,
            )
            .unwrap();

        assert!(checkpoint.members.contains(&EntityId::from("a")));
        assert!(checkpoint.members.contains(&EntityId::from("b")));
        assert!(
            !checkpoint.members.contains(&EntityId::from("c")),
            "temporal edges must not be traversed by checkpoint BFS"
        );
    }

    #[test]
    fn create_checkpoint_respects_time_window() {
        let entities = EntityService::new();
        let relationships = RelationshipService::new();
        entities.create_entity(sample_entity("a")).unwrap();
        entities.create_entity(sample_entity("b")).unwrap();

        let t0 = Utc::now();
        let mut rel = edge("a", "b", RelationshipType::Calls);
        rel.validity = Some(memento_types::TemporalValidity::open(t0));
        relationships.create_relationship(rel).unwrap();

        let store = CheckpointStore::new();
        let before_window = (t0 - chrono::Duration::days(2), t0 - chrono::Duration::days(1));
        let checkpoint = store
            .create_checkpoint(
                &entities,
                &relationships,
                vec![EntityId::from("a")],
                CheckpointReason::Manual,
                2,
                None,
                Some(before_window),
            )
            .unwrap();
        assert!(!checkpoint.members.contains(&EntityId::from("b")));

        let overlapping_window = (t0 - chrono::Duration::days(1), t0 + chrono::Duration::days(1));
        let checkpoint = store
            .create_checkpoint(
                &entities,
                &relationships,
                vec![EntityId::from("a")],
                CheckpointReason::Manual,
                2,
                None,
                Some(overlapping_window),
            )
            .unwrap();
        assert!(checkpoint.members.contains(&EntityId::from("b")));
    }

    #[test]
    fn delete_missing_checkpoint_is_not_found() {
        let store = CheckpointStore::new();
        let err = store.delete_checkpoint(&CheckpointId::new(Uuid::new_v4().to_string())).unwrap_err();
        assert!(matches!(err, MementoError::NotFound(_)));
    }
}
