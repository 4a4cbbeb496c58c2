//! Relationship data model (spec §3): a directed typed edge between two
//! entities. Temporal relationships additionally carry a validity window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{EntityId, RelationshipId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    // Structural
    BelongsTo,
    Contains,
    Defines,
    Exports,
    Imports,
    // Code
    Calls,
    References,
    Implements,
    Extends,
    DependsOn,
    Uses,
    // Test
    Tests,
    Validates,
    LocatedIn,
    // Spec
    Requires,
    Impacts,
    LinkedTo,
    // Temporal
    PreviousVersion,
    ChangedAt,
    ModifiedBy,
    CreatedIn,
    IntroducedIn,
    ModifiedIn,
    RemovedIn,
    // Documentation / security / performance
    Documents,
    HasSecurityIssue,
    HasPerformanceImpact,
}

impl RelationshipType {
    /// Temporal edges carry `validFrom`/`validTo` and are closed, not
    /// deleted, per the invariant in spec §3.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            RelationshipType::PreviousVersion
                | RelationshipType::ChangedAt
                | RelationshipType::ModifiedBy
                | RelationshipType::CreatedIn
                | RelationshipType::IntroducedIn
                | RelationshipType::ModifiedIn
                | RelationshipType::RemovedIn
        )
    }

    /// Structural containment/definition edges (spec §3 "Structural"
    /// group).
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            RelationshipType::BelongsTo
                | RelationshipType::Contains
                | RelationshipType::Defines
                | RelationshipType::Exports
                | RelationshipType::Imports
        )
    }

    /// Code-reference edges (spec §3 "Code" group).
    pub fn is_code(self) -> bool {
        matches!(
            self,
            RelationshipType::Calls
                | RelationshipType::References
                | RelationshipType::Implements
                | RelationshipType::Extends
                | RelationshipType::DependsOn
                | RelationshipType::Uses
        )
    }

    /// Structural or code edges: what checkpoint BFS expansion (spec.md:168)
    /// traverses, to the exclusion of test/spec/temporal/documentation edges.
    pub fn is_structural_or_code(self) -> bool {
        self.is_structural() || self.is_code()
    }

    /// Relative importance used by impact-analysis severity weighting
    /// (spec §4.7): `EXTENDS`/`IMPLEMENTS` outrank `CALLS`, which outranks
    /// `REFERENCES`, which outranks `USES`.
    pub fn impact_weight(self) -> u8 {
        match self {
            RelationshipType::Extends | RelationshipType::Implements => 4,
            RelationshipType::Calls => 3,
            RelationshipType::References => 2,
            RelationshipType::Uses => 1,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub from_entity_id: EntityId,
    pub to_entity_id: EntityId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Present only on temporal relationships.
    pub validity: Option<TemporalValidity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalValidity {
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub active: bool,
}

impl TemporalValidity {
    pub fn open(valid_from: DateTime<Utc>) -> Self {
        Self {
            valid_from,
            valid_to: None,
            active: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }

    pub fn close(&mut self, at: DateTime<Utc>) {
        self.valid_to = Some(at);
        self.active = false;
    }

    /// True if this window covers instant `t` (invariant 2 in spec §8).
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_to.map(|until| t < until).unwrap_or(true)
    }
}

/// The triple that must be unique per open validity window (spec §3
/// invariant: at most one open row per `(from, to, type)`).
pub type RelationshipTriple = (EntityId, EntityId, RelationshipType);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn temporal_edges_are_flagged() {
        assert!(RelationshipType::PreviousVersion.is_temporal());
        assert!(RelationshipType::RemovedIn.is_temporal());
        assert!(!RelationshipType::Calls.is_temporal());
    }

    #[test]
    fn structural_and_code_groups_are_disjoint_from_temporal() {
        assert!(RelationshipType::Contains.is_structural());
        assert!(RelationshipType::Calls.is_code());
        assert!(RelationshipType::Contains.is_structural_or_code());
        assert!(RelationshipType::Calls.is_structural_or_code());
        assert!(!RelationshipType::PreviousVersion.is_structural_or_code());
        assert!(!RelationshipType::Tests.is_structural_or_code());
    }

    #[test]
    fn impact_weight_orders_extends_implements_above_calls_above_references_above_uses() {
        assert!(RelationshipType::Extends.impact_weight() > RelationshipType::Calls.impact_weight());
        assert!(RelationshipType::Calls.impact_weight() > RelationshipType::References.impact_weight());
        assert!(RelationshipType::References.impact_weight() > RelationshipType::Uses.impact_weight());
    }

    #[test]
    fn open_window_covers_now_but_closed_window_does_not_cover_after_close() {
        let t0 = Utc::now();
        let mut validity = TemporalValidity::open(t0);
        assert!(validity.covers(t0 + Duration::seconds(5)));

        let close_at = t0 + Duration::seconds(10);
        validity.close(close_at);
        assert!(!validity.is_open());
        assert!(validity.covers(t0 + Duration::seconds(5)));
        assert!(!validity.covers(close_at));
    }
}
