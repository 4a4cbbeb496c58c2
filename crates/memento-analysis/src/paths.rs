// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Path-finding over the relationship graph (spec §4.7).

use std::collections::{HashMap, HashSet};

use memento_relationship::RelationshipService;
use memento_types::{EntityId, RelationshipType};
use petgraph::algo::dijkstra;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::graph_view::GraphView;

#[derive(Debug, Clone)]
pub struct Path {
    pub entities: Vec<EntityId>,
    pub relationship_types: Vec<RelationshipType>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathResult {
    pub paths: Vec<Path>,
}

#[derive(Debug, Clone, Default)]
pub struct PathCharacteristics {
    pub mean_length: f64,
    pub min_length: usize,
    pub max_length: usize,
    pub path_diversity: f64,
}

/// Unit-weight Dijkstra shortest path restricted to `relationship_types`,
/// returning up to `max_paths` shortest-length paths (spec §4.7:
/// `findPaths`).
pub fn find_paths(
    relationships: &RelationshipService,
    start: &EntityId,
    end: &EntityId,
    relationship_types: Option<&[RelationshipType]>,
    max_paths: usize,
) -> PathResult {
    let view = GraphView::build(relationships, relationship_types);
    let (Some(start_idx), Some(end_idx)) = (view.node_for(start), view.node_for(end)) else {
        return PathResult::default();
    };

    let distances = dijkstra(&view.graph, start_idx, Some(end_idx), |_| 1usize);
    if !distances.contains_key(&end_idx) {
        return PathResult::default();
    }

    let paths = find_all_paths_bounded(&view, start_idx, end_idx, distances[&end_idx] + 1, max_paths);
    PathResult { paths }
}

pub fn find_all_paths(
    relationships: &RelationshipService,
    start: &EntityId,
    end: &EntityId,
    max_depth: usize,
    max_paths: usize,
    relationship_types: Option<&[RelationshipType]>,
) -> PathResult {
    let view = GraphView::build(relationships, relationship_types);
    let (Some(start_idx), Some(end_idx)) = (view.node_for(start), view.node_for(end)) else {
        return PathResult::default();
    };
    PathResult {
        paths: find_all_paths_bounded(&view, start_idx, end_idx, max_depth, max_paths),
    }
}

fn find_all_paths_bounded(
    view: &GraphView,
    start: NodeIndex,
    end: NodeIndex,
    max_depth: usize,
    max_paths: usize,
) -> Vec<Path> {
    let mut results = Vec::new();
    let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, Vec<RelationshipType>)> =
        vec![(start, vec![start], Vec::new())];

    while let Some((current, node_path, type_path)) = stack.pop() {
        if results.len() >= max_paths {
            break;
        }
        if current == end {
            results.push(Path {
                entities: node_path.iter().map(|n| view.graph[*n].clone()).collect(),
                relationship_types: type_path.clone(),
            });
            continue;
        }
        if node_path.len() > max_depth {
            continue;
        }
        for edge in view.graph.edges(current) {
            let next = edge.target();
            if node_path.contains(&next) {
                continue;
            }
            let mut next_nodes = node_path.clone();
            next_nodes.push(next);
            let mut next_types = type_path.clone();
            next_types.push(*edge.weight());
            stack.push((next, next_nodes, next_types));
        }
    }

    results.sort_by_key(|p| p.len());
    results.truncate(max_paths);
    results
}

/// Ranks paths reaching high-importance target types.
pub fn find_critical_paths(
    relationships: &RelationshipService,
    start_ids: &[EntityId],
    target_is_critical: impl Fn(&EntityId) -> bool,
    max_depth: usize,
) -> PathResult {
    let view = GraphView::build(relationships, None);
    let mut all_paths = Vec::new();

    for start in start_ids {
        let Some(start_idx) = view.node_for(start) else {
            continue;
        };
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, Vec<RelationshipType>)> =
            vec![(start_idx, vec![start_idx], Vec::new())];
        while let Some((current, node_path, type_path)) = stack.pop() {
            let current_id = &view.graph[current];
            if node_path.len() > 1 && target_is_critical(current_id) {
                all_paths.push(Path {
                    entities: node_path.iter().map(|n| view.graph[*n].clone()).collect(),
                    relationship_types: type_path.clone(),
                });
                continue;
            }
            if node_path.len() > max_depth {
                continue;
            }
            for edge in view.graph.edges(current) {
                let next = edge.target();
                if node_path.contains(&next) {
                    continue;
                }
                let mut next_nodes = node_path.clone();
                next_nodes.push(next);
                let mut next_types = type_path.clone();
                next_types.push(*edge.weight());
                stack.push((next, next_nodes, next_types));
            }
        }
    }

    all_paths.sort_by_key(|p| p.len());
    PathResult { paths: all_paths }
}

/// Nodes appearing on at least `threshold` paths from the seed set.
pub fn find_bottleneck_nodes(
    relationships: &RelationshipService,
    entity_ids: &[EntityId],
    threshold: usize,
) -> Vec<EntityId> {
    let view = GraphView::build(relationships, None);
    let mut occurrence: HashMap<EntityId, usize> = HashMap::new();

    for seed in entity_ids {
        let Some(seed_idx) = view.node_for(seed) else {
            continue;
        };
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut stack = vec![seed_idx];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            *occurrence.entry(view.graph[current].clone()).or_insert(0) += 1;
            for edge in view.graph.edges(current) {
                stack.push(edge.target());
            }
        }
    }

    occurrence
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(id, _)| id)
        .collect()
}

pub fn analyze_path_characteristics(
    relationships: &RelationshipService,
    start: &EntityId,
    end: &EntityId,
) -> PathCharacteristics {
    let result = find_all_paths(relationships, start, end, 10, 100, None);
    if result.paths.is_empty() {
        return PathCharacteristics::default();
    }

    let lengths: Vec<usize> = result.paths.iter().map(|p| p.len()).collect();
    let mean_length = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    let min_length = *lengths.iter().min().unwrap();
    let max_length = *lengths.iter().max().unwrap();

    // Diversity: fraction of distinct intermediate nodes across all paths
    // relative to total intermediate-node occurrences.
    let mut all_intermediates = 0usize;
    let mut distinct: HashSet<&EntityId> = HashSet::new();
    for path in &result.paths {
        for entity in path.entities.iter().skip(1).take(path.entities.len().saturating_sub(2)) {
            all_intermediates += 1;
            distinct.insert(entity);
        }
    }
    let path_diversity = if all_intermediates == 0 {
        1.0
    } else {
        distinct.len() as f64 / all_intermediates as f64
    };

    PathCharacteristics {
        mean_length,
        min_length,
        max_length,
        path_diversity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn build_chain() -> RelationshipService {
        let service = RelationshipService::new();
        service
            .open_temporal_edge(&EntityId::from("a"), &EntityId::from("b"), RelationshipType::Calls, Utc::now(), None)
            .unwrap();
        service
            .open_temporal_edge(&EntityId::from("b"), &EntityId::from("c"), RelationshipType::Calls, Utc::now(), None)
            .unwrap();
        service
    }

    #[test]
    fn find_paths_returns_shortest_path() {
        let service = build_chain();
        let result = find_paths(&service, &EntityId::from("a"), &EntityId::from("c"), None, 5);
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].len(), 3);
    }

    #[test]
    fn find_paths_start_equals_end_returns_one_zero_length_path() {
        let service = build_chain();
        let result = find_paths(&service, &EntityId::from("a"), &EntityId::from("a"), None, 5);
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].entities, vec![EntityId::from("a")]);
        assert!(result.paths[0].relationship_types.is_empty());
    }

    #[test]
    fn find_paths_returns_empty_for_unreachable_target() {
        let service = RelationshipService::new();
        let result = find_paths(&service, &EntityId::from("a"), &EntityId::from("z"), None, 5);
        assert!(result.paths.is_empty());
    }

    #[test]
    fn bottleneck_nodes_above_threshold_are_reported() {
        let service = build_chain();
        let bottlenecks = find_bottleneck_nodes(&service, &[EntityId::from("a")], 1);
        assert!(bottlenecks.contains(&EntityId::from("b")));
    }
}
