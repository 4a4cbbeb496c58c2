// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Impact analysis and path-finding over the Memento relationship graph.

pub mod graph_view;
pub mod impact;
pub mod paths;

pub use graph_view::GraphView;
pub use impact::{analyze_impact, CascadingImpact, ChangeType, DirectImpact, ImpactResult, Severity};
pub use paths::{
    analyze_path_characteristics, find_all_paths, find_bottleneck_nodes, find_critical_paths,
    find_paths, Path, PathCharacteristics, PathResult,
};
