//! Entity data model (spec §3).
//!
//! `Entity` carries the fields common to every node in the graph; `kind`
//! holds the type-specific payload as a tagged enum. Pattern-matching on
//! `kind` replaces the class hierarchies / type guards of the system this
//! was distilled from (see Design Notes, "tagged unions over inheritance").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EntityId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub path: Option<String>,
    pub hash: Option<String>,
    pub language: Option<String>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub kind: EntityKind,
}

impl Entity {
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "class")]
    Class,
    #[serde(rename = "interface")]
    Interface,
    #[serde(rename = "typeAlias")]
    TypeAlias,
    #[serde(rename = "variable")]
    Variable,
    #[serde(rename = "property")]
    Property,
    #[serde(rename = "method")]
    Method,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Visibility {
    #[serde(rename = "public")]
    #[default]
    Public,
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "protected")]
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestType {
    #[serde(rename = "unit")]
    Unit,
    #[serde(rename = "integration")]
    Integration,
    #[serde(rename = "e2e")]
    E2e,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecStatus {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "implemented")]
    Implemented,
    #[serde(rename = "deprecated")]
    Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckpointReason {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "incident")]
    Incident,
    #[serde(rename = "manual")]
    Manual,
}

/// Type-specific payload for an [`Entity`]. The `type` discriminator is
/// serialized alongside the common fields via `#[serde(flatten)]` on the
/// parent struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityKind {
    File {
        extension: Option<String>,
        size: u64,
        lines: u32,
        is_test: bool,
        is_config: bool,
        #[serde(default)]
        dependencies: Vec<String>,
    },
    Directory {
        #[serde(default)]
        children: Vec<String>,
        file_count: u32,
        directory_count: u32,
        total_size: u64,
    },
    Module {
        #[serde(default)]
        exports: Vec<String>,
        #[serde(default)]
        imports: Vec<String>,
        #[serde(default)]
        dependencies: Vec<String>,
        is_entry_point: bool,
    },
    Symbol {
        kind: SymbolKind,
        signature: Option<String>,
        docstring: Option<String>,
        visibility: Visibility,
        is_exported: bool,
        is_deprecated: bool,
        location: SourceLocation,
    },
    Test {
        test_type: TestType,
        target_symbol: Option<EntityId>,
        #[serde(default)]
        coverage_percent: Option<f32>,
        #[serde(default)]
        executions: u32,
        #[serde(default)]
        failures: u32,
        #[serde(default)]
        flakiness_score: f32,
    },
    Spec {
        title: String,
        description: String,
        #[serde(default)]
        acceptance_criteria: Vec<String>,
        status: SpecStatus,
        priority: u8,
    },
    Session {
        agent_ids: Vec<String>,
    },
    Version {
        entity_id: EntityId,
        hash: String,
        timestamp: DateTime<Utc>,
        change_set_id: Option<String>,
    },
    Checkpoint {
        checkpoint_id: CheckpointId,
        timestamp: DateTime<Utc>,
        hops: u32,
        seed_entities: Vec<EntityId>,
        reason: CheckpointReason,
    },
    Documentation {
        #[serde(default)]
        summary: Option<String>,
    },
    BusinessDomain {
        #[serde(default)]
        name: Option<String>,
    },
    SemanticCluster {
        #[serde(default)]
        label: Option<String>,
    },
    SecurityIssue {
        #[serde(default)]
        severity: Option<String>,
    },
}

impl EntityKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::File { .. } => "file",
            EntityKind::Directory { .. } => "directory",
            EntityKind::Module { .. } => "module",
            EntityKind::Symbol { .. } => "symbol",
            EntityKind::Test { .. } => "test",
            EntityKind::Spec { .. } => "spec",
            EntityKind::Session { .. } => "session",
            EntityKind::Version { .. } => "version",
            EntityKind::Checkpoint { .. } => "checkpoint",
            EntityKind::Documentation { .. } => "documentation",
            EntityKind::BusinessDomain { .. } => "businessDomain",
            EntityKind::SemanticCluster { .. } => "semanticCluster",
            EntityKind::SecurityIssue { .. } => "security-issue",
        }
    }
}

use crate::ids::CheckpointId;

/// Partial-match filter used by `findEntitiesByProperties` and friends.
/// Only populated fields constrain the match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFilter {
    pub entity_type: Option<String>,
    pub path: Option<String>,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub language: Option<String>,
    pub last_modified_since: Option<DateTime<Utc>>,
    pub last_modified_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file_entity() -> Entity {
        Entity {
            id: EntityId::from("f:a.ts"),
            path: Some("src/a.ts".into()),
            hash: Some("h1".into()),
            language: Some("typescript".into()),
            created: Utc::now(),
            last_modified: Utc::now(),
            metadata: Map::new(),
            kind: EntityKind::File {
                extension: Some("ts".into()),
                size: 128,
                lines: 10,
                is_test: false,
                is_config: false,
                dependencies: vec![],
            },
        }
    }

    #[test]
    fn type_name_matches_tagged_variant() {
        assert_eq!(sample_file_entity().type_name(), "file");
    }

    #[test]
    fn round_trips_through_json() {
        let entity = sample_file_entity();
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "file");
        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, entity.id);
        assert_eq!(back.type_name(), "file");
    }
}
