// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Structural, semantic, and hybrid search over the Memento knowledge graph.

pub mod cache;
pub mod pattern;
pub mod request;
pub mod service;

pub use cache::SearchCache;
pub use pattern::{compile_pattern, glob_to_regex, PatternKind};
pub use request::{
    EntityExamples, EntitySnippet, SearchFilters, SearchHit, SearchRequest, SearchResponse, SearchStats, SearchType,
};
pub use service::SearchService;
