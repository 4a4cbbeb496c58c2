// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Builds a read-only `petgraph` view over the relationship store for a
//! single analysis call. Analyses never materialize more than the
//! requested `maxPaths * maxDepth` nodes by construction: the view itself
//! is cheap (one pass over relationships), and traversal bounds are
//! enforced by the algorithms in `paths.rs`.

use std::collections::HashMap;

use memento_relationship::{RelationshipFilter, RelationshipService};
use memento_types::{EntityId, RelationshipType};
use petgraph::graph::{DiGraph, NodeIndex};

pub struct GraphView {
    pub graph: DiGraph<EntityId, RelationshipType>,
    pub index_of: HashMap<EntityId, NodeIndex>,
}

impl GraphView {
    pub fn build(relationships: &RelationshipService, allowed_types: Option<&[RelationshipType]>) -> Self {
        let (edges, _) = relationships.list_relationships(&RelationshipFilter::default(), usize::MAX, 0);
        let mut graph = DiGraph::new();
        let mut index_of: HashMap<EntityId, NodeIndex> = HashMap::new();

        let mut node_index_for = |graph: &mut DiGraph<EntityId, RelationshipType>,
                                   index_of: &mut HashMap<EntityId, NodeIndex>,
                                   id: &EntityId| {
            *index_of
                .entry(id.clone())
                .or_insert_with(|| graph.add_node(id.clone()))
        };

        for edge in edges {
            if let Some(types) = allowed_types {
                if !types.contains(&edge.relationship_type) {
                    continue;
                }
            }
            let from = node_index_for(&mut graph, &mut index_of, &edge.from_entity_id);
            let to = node_index_for(&mut graph, &mut index_of, &edge.to_entity_id);
            graph.add_edge(from, to, edge.relationship_type);
        }

        Self { graph, index_of }
    }

    pub fn node_for(&self, id: &EntityId) -> Option<NodeIndex> {
        self.index_of.get(id).copied()
    }
}
