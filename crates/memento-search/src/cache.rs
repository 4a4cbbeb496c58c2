// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! LRU result cache keyed by the canonicalized search request, invalidated
//! on entity/relationship mutation via registered predicates.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::request::{SearchRequest, SearchResponse};

pub struct SearchCache {
    entries: Mutex<LruCache<String, SearchResponse>>,
    invalidation_predicates: Mutex<Vec<Box<dyn Fn(&str) -> bool + Send + Sync>>>,
}

impl SearchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            invalidation_predicates: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, request: &SearchRequest) -> Option<SearchResponse> {
        self.entries.lock().get(&request.cache_key()).cloned()
    }

    pub fn put(&self, request: &SearchRequest, response: SearchResponse) {
        self.entries.lock().put(request.cache_key(), response);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn register_invalidation(&self, predicate: Box<dyn Fn(&str) -> bool + Send + Sync>) {
        self.invalidation_predicates.lock().push(predicate);
    }

    /// Drops every cached entry whose key matches a registered predicate
    /// for the mutated entity/relationship id.
    pub fn invalidate_for(&self, changed_id: &str) {
        let predicates = self.invalidation_predicates.lock();
        if predicates.iter().any(|p| p(changed_id)) {
            self.entries.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{SearchRequest, SearchType};

    #[test]
    fn cache_hit_returns_stored_response() {
        let cache = SearchCache::new(16);
        let request = SearchRequest {
            query: "foo".into(),
            search_type: SearchType::Structural,
            ..Default::default()
        };
        cache.put(&request, SearchResponse::default());
        assert!(cache.get(&request).is_some());
    }

    #[test]
    fn invalidate_for_clears_cache_when_predicate_matches() {
        let cache = SearchCache::new(16);
        let request = SearchRequest {
            query: "foo".into(),
            search_type: SearchType::Structural,
            ..Default::default()
        };
        cache.put(&request, SearchResponse::default());
        cache.register_invalidation(Box::new(|id| id == "entity-1"));
        cache.invalidate_for("entity-1");
        assert!(cache.is_empty());
    }
}
