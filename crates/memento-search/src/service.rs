// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Structural, semantic, and hybrid search (spec §4.5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memento_embedding::EmbeddingService;
use memento_entity::EntityService;
use memento_relationship::{RelationshipFilter, RelationshipService};
use memento_storage::GraphStore;
use memento_types::{Entity, EntityId, EntityKind, MementoError, Result};

use crate::cache::SearchCache;
use crate::pattern::{compile_pattern, PatternKind};
use crate::request::{
    EntityExamples, EntitySnippet, SearchFilters, SearchHit, SearchRequest, SearchResponse, SearchStats, SearchType,
};

const DEFAULT_STRUCTURAL_WEIGHT: f32 = 0.6;
const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.4;
const CODE_EMBEDDINGS_COLLECTION: &str = "code_embeddings";

fn snippet_for(entity: &Entity) -> String {
    match &entity.kind {
        EntityKind::Symbol { signature, docstring, .. } => signature
            .clone()
            .or_else(|| docstring.clone())
            .unwrap_or_else(|| entity.id.as_str().to_string()),
        _ => entity
            .path
            .clone()
            .unwrap_or_else(|| entity.id.as_str().to_string()),
    }
}

pub struct SearchService {
    entities: Arc<EntityService>,
    relationships: Arc<RelationshipService>,
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<EmbeddingService>,
    cache: SearchCache,
    total_queries: AtomicU64,
    cache_hits: AtomicU64,
}

impl SearchService {
    pub fn new(
        entities: Arc<EntityService>,
        relationships: Arc<RelationshipService>,
        graph: Arc<dyn GraphStore>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            entities,
            relationships,
            graph,
            embeddings,
            cache: SearchCache::new(256),
            total_queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        if let Some(cached) = self.cache.get(&request) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }

        let response = match request.search_type {
            SearchType::Semantic => self.semantic_search(&request.query, &request.filters, request.limit).await?,
            SearchType::Structural => self.structural_search(&request.query, &request.filters, request.limit)?,
            SearchType::Dependency | SearchType::Usage => {
                // Structural base, relationship traversal is layered in by
                // memento-analysis; this service only resolves the seed set.
                self.structural_search(&request.query, &request.filters, request.limit)?
            }
            SearchType::Hybrid => {
                let structural_weight = request.structural_weight.unwrap_or(DEFAULT_STRUCTURAL_WEIGHT);
                let semantic_weight = request.semantic_weight.unwrap_or(DEFAULT_SEMANTIC_WEIGHT);
                self.hybrid_search(&request.query, &request.filters, request.limit, structural_weight, semantic_weight)
                    .await?
            }
        };

        self.cache.put(&request, response.clone());
        Ok(response)
    }

    pub fn structural_search(&self, query: &str, filters: &SearchFilters, limit: usize) -> Result<SearchResponse> {
        let needle = query.to_lowercase();
        let mut hits: Vec<SearchHit> = self
            .entities
            .find_entities_by_properties(&memento_types::EntityFilter {
                path: filters.path.clone(),
                language: filters.language.clone(),
                tags: filters.tags.clone(),
                last_modified_since: filters.last_modified_since,
                last_modified_until: filters.last_modified_until,
                ..Default::default()
            })
            .into_iter()
            .filter(|e| {
                needle.is_empty()
                    || e.id.as_str().to_lowercase().contains(&needle)
                    || e.path.as_deref().unwrap_or_default().to_lowercase().contains(&needle)
            })
            .map(|e| SearchHit {
                entity_id: e.id.as_str().to_string(),
                score: 1.0,
                structural_score: Some(1.0),
                semantic_score: None,
                last_modified: e.last_modified,
            })
            .collect();

        hits.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        hits.truncate(limit.max(1));
        Ok(SearchResponse { hits })
    }

    pub async fn semantic_search(&self, query: &str, _filters: &SearchFilters, limit: usize) -> Result<SearchResponse> {
        let embedding = self.embeddings.generate_embedding(query, None).await?;
        let matches = self
            .graph
            .search_vector(CODE_EMBEDDINGS_COLLECTION, embedding.embedding, limit.max(1), None)
            .await?;

        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            let last_modified = self
                .entities
                .get_entity(&memento_types::EntityId::from(m.id.as_str()))
                .map(|e| e.last_modified)
                .unwrap_or_else(|_| chrono::Utc::now());
            hits.push(SearchHit {
                entity_id: m.id,
                score: m.score,
                structural_score: None,
                semantic_score: Some(m.score),
                last_modified,
            });
        }
        Ok(SearchResponse { hits })
    }

    pub async fn hybrid_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        structural_weight: f32,
        semantic_weight: f32,
    ) -> Result<SearchResponse> {
        let (structural, semantic) = tokio::join!(
            async { self.structural_search(query, filters, limit) },
            self.semantic_search(query, filters, limit),
        );
        let structural = structural?;
        let semantic = semantic?;

        let mut merged: std::collections::HashMap<String, SearchHit> = std::collections::HashMap::new();
        for hit in structural.hits {
            merged.insert(hit.entity_id.clone(), hit);
        }
        for hit in semantic.hits {
            merged
                .entry(hit.entity_id.clone())
                .and_modify(|existing| {
                    existing.semantic_score = hit.semantic_score;
                })
                .or_insert(hit);
        }

        let mut combined: Vec<SearchHit> = merged
            .into_values()
            .map(|mut hit| {
                let structural_score = hit.structural_score.unwrap_or(0.0);
                let semantic_score = hit.semantic_score.unwrap_or(0.0);
                hit.score = structural_weight * structural_score + semantic_weight * semantic_score;
                hit
            })
            .collect();

        combined.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.last_modified.cmp(&a.last_modified))
        });
        combined.truncate(limit.max(1));
        Ok(SearchResponse { hits: combined })
    }

    pub fn find_symbols_by_name(&self, name: &str, fuzzy: bool, limit: usize) -> Vec<SearchHit> {
        let needle = name.to_lowercase();
        let mut hits: Vec<SearchHit> = self
            .entities
            .get_entities_by_type("symbol")
            .into_iter()
            .filter(|e| {
                let entity_name = e
                    .metadata
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_lowercase();
                if fuzzy {
                    entity_name.contains(&needle)
                } else {
                    entity_name == needle
                }
            })
            .map(|e| SearchHit {
                entity_id: e.id.as_str().to_string(),
                score: 1.0,
                structural_score: Some(1.0),
                semantic_score: None,
                last_modified: e.last_modified,
            })
            .collect();
        hits.truncate(limit.max(1));
        hits
    }

    pub fn find_nearby_symbols(&self, file_path: &str, line: u32, range: u32, limit: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entities
            .get_entities_by_file(file_path)
            .into_iter()
            .filter_map(|e| {
                if let memento_types::EntityKind::Symbol { location, .. } = &e.kind {
                    let distance = (location.line as i64 - line as i64).unsigned_abs() as u32;
                    if distance <= range {
                        return Some(SearchHit {
                            entity_id: e.id.as_str().to_string(),
                            score: 1.0 / (1.0 + distance as f32),
                            structural_score: Some(1.0),
                            semantic_score: None,
                            last_modified: e.last_modified,
                        });
                    }
                }
                None
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit.max(1));
        hits
    }

    pub fn pattern_search(&self, pattern: &str, kind: PatternKind, limit: usize) -> Result<Vec<SearchHit>> {
        let regex = compile_pattern(pattern, kind)?;
        let mut hits: Vec<SearchHit> = self
            .entities
            .find_entities_by_properties(&memento_types::EntityFilter::default())
            .into_iter()
            .filter(|e| e.path.as_deref().map(|p| regex.is_match(p)).unwrap_or(false))
            .map(|e| SearchHit {
                entity_id: e.id.as_str().to_string(),
                score: 1.0,
                structural_score: Some(1.0),
                semantic_score: None,
                last_modified: e.last_modified,
            })
            .collect();
        hits.truncate(limit.max(1));
        Ok(hits)
    }

    /// Snippet for `id` plus the entities that reference it via a
    /// structural or code edge, most recently modified first.
    pub fn get_entity_examples(&self, id: &EntityId) -> Result<EntityExamples> {
        let entity = self
            .entities
            .get_entity(id)
            .map_err(|_| MementoError::NotFound(format!("entity {id}")))?;

        let mut snippets = vec![EntitySnippet {
            entity_id: entity.id.as_str().to_string(),
            path: entity.path.clone(),
            snippet: snippet_for(&entity),
        }];

        let (incoming, _) = self.relationships.list_relationships(
            &RelationshipFilter {
                to_entity: Some(id.clone()),
                ..Default::default()
            },
            usize::MAX,
            0,
        );

        let mut references: Vec<SearchHit> = Vec::new();
        for rel in incoming {
            if !rel.relationship_type.is_structural_or_code() {
                continue;
            }
            if let Ok(source) = self.entities.get_entity(&rel.from_entity_id) {
                snippets.push(EntitySnippet {
                    entity_id: source.id.as_str().to_string(),
                    path: source.path.clone(),
                    snippet: snippet_for(&source),
                });
                references.push(SearchHit {
                    entity_id: source.id.as_str().to_string(),
                    score: 1.0,
                    structural_score: Some(1.0),
                    semantic_score: None,
                    last_modified: source.last_modified,
                });
            }
        }

        references.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(EntityExamples { snippets, references })
    }

    pub fn get_search_stats(&self) -> SearchStats {
        SearchStats {
            cache_size: self.cache.len(),
            total_queries: self.total_queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn invalidate_cache(&self, changed_entity_id: &str) {
        self.cache.invalidate_for(changed_entity_id);
    }

    pub fn register_invalidation(&self, predicate: Box<dyn Fn(&str) -> bool + Send + Sync>) {
        self.cache.register_invalidation(predicate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memento_embedding::EmbeddingConfig;
    use memento_storage::InMemoryGraphStore;
    use memento_types::{Entity, EntityId, EntityKind};
    use serde_json::Map;

    fn sample_entity(id: &str, path: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            path: Some(path.to_string()),
            hash: Some("h".into()),
            language: Some("rust".into()),
            created: chrono::Utc::now(),
            last_modified: chrono::Utc::now(),
            metadata: Map::new(),
            kind: EntityKind::File {
                extension: Some("rs".into()),
                size: 10,
                lines: 1,
                is_test: false,
                is_config: false,
                dependencies: vec![],
            },
        }
    }

    fn build_service() -> SearchService {
        let entities = Arc::new(EntityService::new());
        entities.create_entity(sample_entity("a", "src/alpha.rs")).unwrap();
        entities.create_entity(sample_entity("b", "src/beta.rs")).unwrap();
        let relationships = Arc::new(RelationshipService::new());
        let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let embeddings = Arc::new(EmbeddingService::new(EmbeddingConfig {
            dimensions: 8,
            ..Default::default()
        }));
        SearchService::new(entities, relationships, graph, embeddings)
    }

    #[test]
    fn structural_search_matches_path_substring() {
        let service = build_service();
        let response = service
            .structural_search("alpha", &SearchFilters::default(), 10)
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].entity_id, "a");
    }

    #[test]
    fn pattern_search_matches_glob() {
        let service = build_service();
        let hits = service
            .pattern_search("src/*.rs", PatternKind::Glob, 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn get_entity_examples_includes_snippet_and_referencing_entities() {
        let entities = Arc::new(EntityService::new());
        entities.create_entity(sample_entity("a", "src/alpha.rs")).unwrap();
        entities.create_entity(sample_entity("b", "src/beta.rs")).unwrap();
        let relationships = Arc::new(RelationshipService::new());
        relationships
            .create_relationship(memento_types::Relationship {
                id: memento_types::RelationshipId::new(uuid::Uuid::new_v4().to_string()),
                from_entity_id: EntityId::from("b"),
                to_entity_id: EntityId::from("a"),
                relationship_type: memento_types::RelationshipType::Calls,
                created: chrono::Utc::now(),
                last_modified: chrono::Utc::now(),
                version: 1,
                metadata: Map::new(),
                validity: None,
            })
            .unwrap();
        let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let embeddings = Arc::new(EmbeddingService::new(EmbeddingConfig {
            dimensions: 8,
            ..Default::default()
        }));
        let service = SearchService::new(entities, relationships, graph, embeddings);

        let examples = service.get_entity_examples(&EntityId::from("a")).unwrap();
        assert_eq!(examples.snippets[0].entity_id, "a");
        assert_eq!(examples.references.len(), 1);
        assert_eq!(examples.references[0].entity_id, "b");
    }

    #[test]
    fn get_entity_examples_missing_entity_is_not_found() {
        let service = build_service();
        let err = service
            .get_entity_examples(&EntityId::from("missing"))
            .unwrap_err();
        assert!(matches!(err, MementoError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_caches_second_identical_request() {
        let service = build_service();
        let request = SearchRequest {
            query: "alpha".into(),
            search_type: SearchType::Structural,
            limit: 10,
            ..Default::default()
        };
        service.search(request.clone()).await.unwrap();
        service.search(request).await.unwrap();
        let stats = service.get_search_stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.cache_hits, 1);
    }
}
