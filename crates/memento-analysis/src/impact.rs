// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Impact analysis (spec §4.7): direct + cascading effect of a proposed
//! change to an entity.

use memento_relationship::{RelationshipFilter, RelationshipService};
use memento_types::{EntityId, RelationshipType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Modify,
    Delete,
    Rename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct DirectImpact {
    pub entity_id: EntityId,
    pub severity: Severity,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CascadingImpact {
    pub level: u32,
    pub entity_id: EntityId,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ImpactResult {
    pub direct: Vec<DirectImpact>,
    pub cascading: Vec<CascadingImpact>,
}

fn change_multiplier(change_type: ChangeType) -> f32 {
    match change_type {
        ChangeType::Delete => 3.0,
        ChangeType::Rename => 2.0,
        ChangeType::Modify => 1.0,
    }
}

fn severity_for(weight: u8, change_type: ChangeType) -> Severity {
    let score = weight as f32 * change_multiplier(change_type);
    if score >= 8.0 {
        Severity::High
    } else if score >= 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn analyze_impact(
    relationships: &RelationshipService,
    entity_id: &EntityId,
    change_type: ChangeType,
    include_indirect: bool,
    max_depth: u32,
    relationship_types: Option<&[RelationshipType]>,
) -> ImpactResult {
    let (direct_edges, _) = relationships.list_relationships(
        &RelationshipFilter {
            to_entity: Some(entity_id.clone()),
            ..Default::default()
        },
        usize::MAX,
        0,
    );

    let mut direct = Vec::new();
    for edge in &direct_edges {
        if let Some(types) = relationship_types {
            if !types.contains(&edge.relationship_type) {
                continue;
            }
        }
        let severity = severity_for(edge.relationship_type.impact_weight(), change_type);
        direct.push(DirectImpact {
            entity_id: edge.from_entity_id.clone(),
            severity,
            reason: format!(
                "depends on {entity_id} via {:?}, which is being {:?}d",
                edge.relationship_type, change_type
            ),
        });
    }

    let mut cascading = Vec::new();
    if include_indirect {
        let mut frontier: Vec<(EntityId, u32)> =
            direct_edges.iter().map(|e| (e.from_entity_id.clone(), 1)).collect();
        let mut visited: std::collections::HashSet<EntityId> =
            direct_edges.iter().map(|e| e.from_entity_id.clone()).collect();

        while let Some((current, level)) = frontier.pop() {
            if level >= max_depth {
                continue;
            }
            let (edges, _) = relationships.list_relationships(
                &RelationshipFilter {
                    to_entity: Some(current.clone()),
                    ..Default::default()
                },
                usize::MAX,
                0,
            );
            for edge in edges {
                if let Some(types) = relationship_types {
                    if !types.contains(&edge.relationship_type) {
                        continue;
                    }
                }
                if visited.insert(edge.from_entity_id.clone()) {
                    let confidence = 1.0 / (level as f32 + 1.0);
                    cascading.push(CascadingImpact {
                        level: level + 1,
                        entity_id: edge.from_entity_id.clone(),
                        relationship_type: edge.relationship_type,
                        confidence,
                    });
                    frontier.push((edge.from_entity_id, level + 1));
                }
            }
        }
    }

    ImpactResult { direct, cascading }
}
