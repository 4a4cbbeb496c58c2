// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Version history, timeline queries, pruning, and checkpoints for Memento.

pub mod checkpoint;
pub mod version;

pub use checkpoint::{CheckpointExport, CheckpointRecord, CheckpointStore};
pub use version::{Version, VersionStore};
