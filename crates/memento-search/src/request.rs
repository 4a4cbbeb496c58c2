// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Search request/response types shared across strategies.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    #[default]
    Hybrid,
    Structural,
    Semantic,
    Dependency,
    Usage,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub tags: Option<Vec<String>>,
    pub path: Option<String>,
    pub language: Option<String>,
    pub checkpoint_id: Option<String>,
    pub last_modified_since: Option<DateTime<Utc>>,
    pub last_modified_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub search_type: SearchType,
    pub filters: SearchFilters,
    pub limit: usize,
    pub structural_weight: Option<f32>,
    pub semantic_weight: Option<f32>,
}

impl SearchRequest {
    /// Canonicalized cache key: field order is fixed so equivalent requests
    /// always collide to the same string.
    pub fn cache_key(&self) -> String {
        format!(
            "{:?}|{}|{}|{:?}|{:?}|{:?}|{:?}",
            self.search_type,
            self.query,
            self.limit,
            self.filters.tags,
            self.filters.path,
            self.filters.language,
            self.filters.checkpoint_id,
        )
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entity_id: String,
    pub score: f32,
    pub structural_score: Option<f32>,
    pub semantic_score: Option<f32>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone)]
pub struct EntitySnippet {
    pub entity_id: String,
    pub path: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityExamples {
    pub snippets: Vec<EntitySnippet>,
    pub references: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub cache_size: usize,
    pub total_queries: u64,
    pub cache_hits: u64,
}
