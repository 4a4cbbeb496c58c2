// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Entity CRUD, bulk upsert, and cursor-paginated listing.

use std::collections::HashMap;

use chrono::Utc;
use dashmap::DashMap;
use memento_types::{
    pagination::{base64_cursor, OrderDirection},
    Entity, EntityFilter, EntityId, MementoError, Page, PageResult, Result,
};

use crate::events::{EntityEvent, EntityEventBus};

#[derive(Debug, Default, Clone)]
pub struct BulkUpsertOptions {
    pub skip_existing: bool,
    pub update_existing: bool,
}

#[derive(Debug, Default, Clone)]
pub struct BulkUpsertReport {
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<(EntityId, String)>,
}

/// Incident-relationship cleanup hook, invoked when an entity is deleted.
/// Lets `memento-relationship` stay a separate crate without `memento-entity`
/// depending on it directly.
pub trait IncidentRelationshipSink: Send + Sync {
    fn delete_incident(&self, entity_id: &EntityId);
}

pub struct EntityService {
    entities: DashMap<EntityId, Entity>,
    events: EntityEventBus,
    incidents: Option<Box<dyn IncidentRelationshipSink>>,
}

impl Default for EntityService {
    fn default() -> Self {
        Self {
            entities: DashMap::new(),
            events: EntityEventBus::new(),
            incidents: None,
        }
    }
}

impl EntityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incident_sink(mut self, sink: Box<dyn IncidentRelationshipSink>) -> Self {
        self.incidents = Some(sink);
        self
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EntityEvent> {
        self.events.subscribe()
    }

    pub fn create_entity(&self, entity: Entity) -> Result<Entity> {
        if self.entities.contains_key(&entity.id) {
            return Err(MementoError::Conflict(format!(
                "entity {} already exists",
                entity.id
            )));
        }
        self.entities.insert(entity.id.clone(), entity.clone());
        self.events.emit(EntityEvent::Created(entity.clone()));
        Ok(entity)
    }

    pub fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        self.entities
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| MementoError::NotFound(format!("entity {id}")))
    }

    pub fn entity_exists(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Idempotent on `id`: `last_modified` only advances when `hash` changed
    /// from the stored version (or the entity is new).
    pub fn upsert_entity(&self, mut entity: Entity) -> Result<Entity> {
        let is_new = !self.entities.contains_key(&entity.id);
        if !is_new {
            if let Some(existing) = self.entities.get(&entity.id) {
                if existing.hash == entity.hash {
                    entity.last_modified = existing.last_modified;
                } else {
                    entity.last_modified = Utc::now();
                }
            }
        } else {
            entity.last_modified = Utc::now();
        }
        self.entities.insert(entity.id.clone(), entity.clone());
        if is_new {
            self.events.emit(EntityEvent::Created(entity.clone()));
        } else {
            self.events.emit(EntityEvent::Updated(entity.clone()));
        }
        Ok(entity)
    }

    pub fn update_entity(&self, id: &EntityId, patch: Entity) -> Result<Entity> {
        if !self.entities.contains_key(id) {
            return Err(MementoError::NotFound(format!("entity {id}")));
        }
        let mut updated = patch;
        updated.id = id.clone();
        updated.last_modified = Utc::now();
        self.entities.insert(id.clone(), updated.clone());
        self.events.emit(EntityEvent::Updated(updated.clone()));
        Ok(updated)
    }

    pub fn delete_entity(&self, id: &EntityId) -> Result<()> {
        self.entities
            .remove(id)
            .ok_or_else(|| MementoError::NotFound(format!("entity {id}")))?;
        if let Some(sink) = &self.incidents {
            sink.delete_incident(id);
        }
        self.events.emit(EntityEvent::Deleted(id.clone()));
        Ok(())
    }

    /// Groups by type, applying each group independently: a failure within
    /// one type's batch never aborts sibling type groups.
    pub fn create_entities_bulk(
        &self,
        entities: Vec<Entity>,
        options: BulkUpsertOptions,
    ) -> BulkUpsertReport {
        let mut groups: HashMap<&'static str, Vec<Entity>> = HashMap::new();
        for entity in entities {
            groups.entry(entity.type_name()).or_default().push(entity);
        }

        let mut report = BulkUpsertReport::default();
        for (_type_name, group) in groups {
            for entity in group {
                let exists = self.entities.contains_key(&entity.id);
                if exists && options.skip_existing && !options.update_existing {
                    continue;
                }
                match self.upsert_entity(entity.clone()) {
                    Ok(_) if exists => report.updated += 1,
                    Ok(_) => report.created += 1,
                    Err(e) => report.failed.push((entity.id, e.to_string())),
                }
            }
        }
        report
    }

    pub fn find_entities_by_properties(&self, filter: &EntityFilter) -> Vec<Entity> {
        self.entities
            .iter()
            .map(|e| e.clone())
            .filter(|e| matches_filter(e, filter))
            .collect()
    }

    pub fn get_entities_by_file(&self, path: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| e.path.as_deref() == Some(path))
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_entities_by_type(&self, type_name: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| e.type_name() == type_name)
            .map(|e| e.clone())
            .collect()
    }

    pub fn list_entities(&self, page: &Page, filter: &EntityFilter) -> Result<PageResult<Entity>> {
        let mut matched: Vec<Entity> = self
            .entities
            .iter()
            .map(|e| e.clone())
            .filter(|e| matches_filter(e, filter))
            .collect();

        matched.sort_by(|a, b| {
            let ord = order_key(a).cmp(&order_key(b)).then(a.id.as_str().cmp(b.id.as_str()));
            match page.order_direction {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            }
        });

        let total = matched.len();
        let start = if let Some(cursor) = &page.cursor {
            let (order_value, id) = base64_cursor::decode_cursor(cursor)
                .ok_or_else(|| MementoError::InputValidation("invalid cursor".to_string()))?;
            matched
                .iter()
                .position(|e| order_key(e) == order_value && e.id.as_str() == id)
                .map(|i| i + 1)
                .unwrap_or(0)
        } else {
            page.offset.unwrap_or(0)
        };

        let limit = page.limit.max(1);
        let end = (start + limit).min(matched.len());
        let items: Vec<Entity> = if start < matched.len() {
            matched[start..end].to_vec()
        } else {
            Vec::new()
        };

        let next_cursor = if end < matched.len() {
            items
                .last()
                .map(|e| base64_cursor::encode_cursor(&order_key(e), e.id.as_str()))
        } else {
            None
        };

        Ok(PageResult {
            items,
            total,
            next_cursor,
        })
    }
}

fn order_key(entity: &Entity) -> String {
    entity
        .last_modified
        .to_rfc3339()
}

fn matches_filter(entity: &Entity, filter: &EntityFilter) -> bool {
    if let Some(t) = &filter.entity_type {
        if entity.type_name() != t {
            return false;
        }
    }
    if let Some(path) = &filter.path {
        if entity.path.as_deref() != Some(path.as_str()) {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        let entity_name = entity
            .metadata
            .get("name")
            .and_then(|v| v.as_str())
            .or(entity.path.as_deref());
        if entity_name != Some(name.as_str()) {
            return false;
        }
    }
    if let Some(language) = &filter.language {
        if entity.language.as_deref() != Some(language.as_str()) {
            return false;
        }
    }
    if let Some(tags) = &filter.tags {
        let entity_tags: Vec<String> = entity
            .metadata
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if !tags.iter().all(|t| entity_tags.contains(t)) {
            return false;
        }
    }
    if let Some(since) = filter.last_modified_since {
        if entity.last_modified < since {
            return false;
        }
    }
    if let Some(until) = filter.last_modified_until {
        if entity.last_modified > until {
            return false;
        }
    }
    for (key, expected) in &filter.properties {
        if entity.metadata.get(key) != Some(expected) {
            return false;
        }
    }
    true
}
