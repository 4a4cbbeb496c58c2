// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Entity CRUD, bulk upsert, and listing service for Memento.

pub mod events;
pub mod service;

pub use events::{EntityEvent, EntityEventBus};
pub use service::{BulkUpsertOptions, BulkUpsertReport, EntityService, IncidentRelationshipSink};
