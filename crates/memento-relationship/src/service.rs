// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Relationship CRUD, bulk upsert with merge semantics, and temporal edge
//! open/close (spec §4.3).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use memento_types::{
    EntityId, MementoError, Relationship, RelationshipId, RelationshipType, Result,
    TemporalValidity,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use memento_entity::IncidentRelationshipSink;

#[derive(Debug, Default, Clone)]
pub struct RelationshipFilter {
    pub from_entity: Option<EntityId>,
    pub to_entity: Option<EntityId>,
    pub relationship_type: Option<RelationshipType>,
}

#[derive(Debug, Default, Clone)]
pub struct BulkUpsertReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

fn triple_matches(rel: &Relationship, from: &EntityId, to: &EntityId, ty: RelationshipType) -> bool {
    rel.from_entity_id == *from && rel.to_entity_id == *to && rel.relationship_type == ty
}

fn merge_metadata(existing: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (k, v) in incoming {
        existing.insert(k.clone(), v.clone());
    }
}

#[derive(Default)]
pub struct RelationshipService {
    relationships: DashMap<RelationshipId, Relationship>,
}

impl RelationshipService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforces the open-triple invariant: at most one row with an open
    /// validity window per (from, to, type). An incoming relationship that
    /// matches an existing open row merges into it instead of inserting a
    /// duplicate, mirroring `create_relationships_bulk`.
    pub fn create_relationship(&self, incoming: Relationship) -> Result<Relationship> {
        let existing_id = self.relationships.iter().find_map(|entry| {
            let r = entry.value();
            let triple_open = triple_matches(
                r,
                &incoming.from_entity_id,
                &incoming.to_entity_id,
                incoming.relationship_type,
            ) && r.validity.as_ref().map(|v| v.is_open()).unwrap_or(true);
            triple_open.then(|| r.id.clone())
        });

        match existing_id.and_then(|id| self.relationships.get_mut(&id)) {
            Some(mut entry) => {
                merge_metadata(&mut entry.metadata, &incoming.metadata);
                entry.last_modified = Utc::now();
                entry.version += 1;
                Ok(entry.clone())
            }
            None => {
                self.relationships
                    .insert(incoming.id.clone(), incoming.clone());
                Ok(incoming)
            }
        }
    }

    pub fn delete_relationship(&self, id: &RelationshipId, force: bool) -> Result<()> {
        let relationship = self
            .relationships
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| MementoError::NotFound(format!("relationship {id}")))?;

        if relationship.relationship_type.is_temporal() && !force {
            // Temporal edges are closed, not deleted, unless explicitly forced.
            self.close_temporal_edge(
                &relationship.from_entity_id,
                &relationship.to_entity_id,
                relationship.relationship_type,
                Utc::now(),
            )?;
            return Ok(());
        }

        self.relationships.remove(id);
        Ok(())
    }

    pub fn list_relationships(
        &self,
        filter: &RelationshipFilter,
        limit: usize,
        offset: usize,
    ) -> (Vec<Relationship>, usize) {
        let mut matched: Vec<Relationship> = self
            .relationships
            .iter()
            .map(|r| r.clone())
            .filter(|r| {
                filter
                    .from_entity
                    .as_ref()
                    .map(|e| r.from_entity_id == *e)
                    .unwrap_or(true)
                    && filter
                        .to_entity
                        .as_ref()
                        .map(|e| r.to_entity_id == *e)
                        .unwrap_or(true)
                    && filter
                        .relationship_type
                        .map(|t| r.relationship_type == t)
                        .unwrap_or(true)
            })
            .collect();
        matched.sort_by(|a, b| a.created.cmp(&b.created));
        let total = matched.len();
        let end = (offset + limit.max(1)).min(matched.len());
        let items = if offset < matched.len() {
            matched[offset..end].to_vec()
        } else {
            Vec::new()
        };
        (items, total)
    }

    /// Merges duplicate (same triple, still open) relationships: metadata
    /// unions shallowly, `last_modified` updates, `version` increments.
    pub fn create_relationships_bulk(&self, relationships: Vec<Relationship>) -> BulkUpsertReport {
        let mut report = BulkUpsertReport::default();
        for incoming in relationships {
            let existing_id = self.relationships.iter().find_map(|entry| {
                let r = entry.value();
                let triple_open = triple_matches(
                    r,
                    &incoming.from_entity_id,
                    &incoming.to_entity_id,
                    incoming.relationship_type,
                ) && r.validity.as_ref().map(|v| v.is_open()).unwrap_or(true);
                triple_open.then(|| r.id.clone())
            });

            match existing_id.and_then(|id| self.relationships.get_mut(&id)) {
                Some(mut entry) => {
                    merge_metadata(&mut entry.metadata, &incoming.metadata);
                    entry.last_modified = Utc::now();
                    entry.version += 1;
                    report.updated += 1;
                }
                None => {
                    self.relationships.insert(incoming.id.clone(), incoming);
                    report.created += 1;
                }
            }
        }
        report
    }

    /// No-op when an open row for this triple already exists.
    pub fn open_temporal_edge(
        &self,
        from: &EntityId,
        to: &EntityId,
        relationship_type: RelationshipType,
        at: DateTime<Utc>,
        change_set_id: Option<String>,
    ) -> Result<Relationship> {
        if let Some(existing) = self.relationships.iter().find(|r| {
            triple_matches(r.value(), from, to, relationship_type)
                && r.validity.as_ref().map(|v| v.is_open()).unwrap_or(false)
        }) {
            return Ok(existing.value().clone());
        }

        let mut metadata = Map::new();
        if let Some(cs) = change_set_id {
            metadata.insert("changeSetId".to_string(), Value::String(cs));
        }

        let relationship = Relationship {
            id: RelationshipId::new(Uuid::new_v4().to_string()),
            from_entity_id: from.clone(),
            to_entity_id: to.clone(),
            relationship_type,
            created: at,
            last_modified: at,
            version: 1,
            metadata,
            validity: Some(TemporalValidity::open(at)),
        };
        self.relationships
            .insert(relationship.id.clone(), relationship.clone());
        Ok(relationship)
    }

    pub fn close_temporal_edge(
        &self,
        from: &EntityId,
        to: &EntityId,
        relationship_type: RelationshipType,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let open = self.relationships.iter().find_map(|entry| {
            let r = entry.value();
            (triple_matches(r, from, to, relationship_type)
                && r.validity.as_ref().map(|v| v.is_open()).unwrap_or(false))
            .then(|| r.id.clone())
        });

        if let Some(mut entry) = open.and_then(|id| self.relationships.get_mut(&id)) {
            if let Some(validity) = entry.validity.as_mut() {
                validity.close(at);
            }
            entry.last_modified = at;
        }
        Ok(())
    }
}

impl IncidentRelationshipSink for RelationshipService {
    fn delete_incident(&self, entity_id: &EntityId) {
        let incident_ids: Vec<RelationshipId> = self
            .relationships
            .iter()
            .filter(|r| r.from_entity_id == *entity_id || r.to_entity_id == *entity_id)
            .map(|r| r.id.clone())
            .collect();
        for id in incident_ids {
            self.relationships.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str) -> Relationship {
        Relationship {
            id: RelationshipId::new(Uuid::new_v4().to_string()),
            from_entity_id: EntityId::from(from),
            to_entity_id: EntityId::from(to),
            relationship_type: RelationshipType::Calls,
            created: Utc::now(),
            last_modified: Utc::now(),
            version: 1,
            metadata: Map::new(),
            validity: None,
        }
    }

    #[test]
    fn opening_an_already_open_temporal_edge_is_a_no_op() {
        let service = RelationshipService::new();
        let first = service
            .open_temporal_edge(
                &EntityId::from("a"),
                &EntityId::from("b"),
                RelationshipType::ModifiedIn,
                Utc::now(),
                None,
            )
            .unwrap();
        let second = service
            .open_temporal_edge(
                &EntityId::from("a"),
                &EntityId::from("b"),
                RelationshipType::ModifiedIn,
                Utc::now(),
                None,
            )
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn closing_a_temporal_edge_sets_valid_to_and_active_false() {
        let service = RelationshipService::new();
        let opened_at = Utc::now();
        service
            .open_temporal_edge(&EntityId::from("a"), &EntityId::from("b"), RelationshipType::ModifiedIn, opened_at, None)
            .unwrap();
        let closed_at = opened_at + chrono::Duration::seconds(10);
        service
            .close_temporal_edge(&EntityId::from("a"), &EntityId::from("b"), RelationshipType::ModifiedIn, closed_at)
            .unwrap();

        let (items, _) = service.list_relationships(&RelationshipFilter::default(), 10, 0);
        let validity = items[0].validity.as_ref().unwrap();
        assert!(!validity.is_open());
        assert_eq!(validity.valid_to, Some(closed_at));
    }

    #[test]
    fn bulk_merges_duplicate_open_triples() {
        let service = RelationshipService::new();
        let mut first = edge("a", "b");
        first.validity = Some(TemporalValidity::open(Utc::now()));
        first.relationship_type = RelationshipType::ModifiedIn;
        first.metadata.insert("x".into(), Value::from(1));

        let mut second = first.clone();
        second.id = RelationshipId::new(Uuid::new_v4().to_string());
        second.metadata = Map::new();
        second.metadata.insert("y".into(), Value::from(2));

        let report = service.create_relationships_bulk(vec![first, second]);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn delete_incident_removes_relationships_touching_entity() {
        let service = RelationshipService::new();
        service.create_relationship(edge("a", "b")).unwrap();
        service.delete_incident(&EntityId::from("a"));
        let (items, total) = service.list_relationships(&RelationshipFilter::default(), 10, 0);
        assert_eq!(total, 0);
        assert!(items.is_empty());
    }
}
