//! Core data model for the Memento temporal knowledge graph.
//!
//! This crate is intentionally free of any storage or async runtime
//! dependency: it defines the entity/relationship/session types and the
//! shared error and pagination types every other `memento-*` crate builds
//! on top of.

pub mod entity;
pub mod error;
pub mod ids;
pub mod pagination;
pub mod relationship;
pub mod session;

pub use entity::{
    CheckpointReason, Entity, EntityFilter, EntityKind, SourceLocation, SpecStatus, SymbolKind,
    TestType, Visibility,
};
pub use error::{MementoError, Result};
pub use ids::{
    AgentId, ChangeSetId, CheckpointId, EntityId, JobId, RelationshipId, SessionId, TaskId,
    VersionId,
};
pub use pagination::{OrderDirection, Page, PageResult};
pub use relationship::{Relationship, RelationshipTriple, RelationshipType, TemporalValidity};
pub use session::{
    Session, SessionEvent, SessionEventType, SessionState, StateTransition, VerifiedBy,
};
