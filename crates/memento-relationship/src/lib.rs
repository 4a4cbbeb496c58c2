// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Relationship CRUD, bulk upsert, and temporal edge management for Memento.

pub mod service;

pub use service::{BulkUpsertReport, RelationshipFilter, RelationshipService};
