// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Version append and timeline queries (spec §4.6.1, §4.6.2).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use memento_types::{EntityId, VersionId};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Version {
    pub id: VersionId,
    pub entity_id: EntityId,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub previous_version_id: Option<VersionId>,
    pub change_set_id: Option<String>,
    pub path: Option<String>,
    pub language: Option<String>,
}

#[derive(Default)]
pub struct VersionStore {
    versions: DashMap<VersionId, Version>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a version on a hash change. Invariant: at most one
    /// `previous_version_id` per version, pointing to the immediate
    /// predecessor by timestamp.
    pub fn append(
        &self,
        entity_id: &EntityId,
        hash: &str,
        timestamp: DateTime<Utc>,
        change_set_id: Option<String>,
        path: Option<String>,
        language: Option<String>,
    ) -> Version {
        let previous = self
            .versions
            .iter()
            .filter(|v| v.entity_id == *entity_id && v.timestamp < timestamp)
            .max_by_key(|v| v.timestamp)
            .map(|v| v.id.clone());

        let version = Version {
            id: VersionId::new(Uuid::new_v4().to_string()),
            entity_id: entity_id.clone(),
            hash: hash.to_string(),
            timestamp,
            previous_version_id: previous,
            change_set_id,
            path,
            language,
        };
        self.versions.insert(version.id.clone(), version.clone());
        version
    }

    /// Newest first; ties at the same timestamp break lexicographically by
    /// hash.
    pub fn timeline(
        &self,
        entity_id: &EntityId,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .versions
            .iter()
            .filter(|v| v.entity_id == *entity_id)
            .filter(|v| start_time.map(|t| v.timestamp >= t).unwrap_or(true))
            .filter(|v| end_time.map(|t| v.timestamp <= t).unwrap_or(true))
            .map(|v| v.clone())
            .collect();

        versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.hash.cmp(&b.hash)));
        versions.truncate(limit.max(1));
        versions
    }

    pub fn prune_before(&self, cutoff: DateTime<Utc>, dry_run: bool) -> usize {
        let expired: Vec<VersionId> = self
            .versions
            .iter()
            .filter(|v| v.timestamp < cutoff)
            .map(|v| v.id.clone())
            .collect();
        if !dry_run {
            for id in &expired {
                self.versions.remove(id);
            }
        }
        expired.len()
    }

    /// Repairs a version's `previous_version_id` link, used by the
    /// temporal history validator when it finds a version missing its
    /// predecessor pointer (spec §4.11).
    pub fn repair_previous_version_link(
        &self,
        version_id: &VersionId,
        previous_version_id: VersionId,
    ) -> bool {
        match self.versions.get_mut(version_id) {
            Some(mut version) => {
                version.previous_version_id = Some(previous_version_id);
                true
            }
            None => false,
        }
    }

    /// Drops a version's `previous_version_id` link entirely. Exercises the
    /// `missing_previous` path of the temporal history validator in tests.
    pub fn clear_previous_version_link(&self, version_id: &VersionId) -> bool {
        match self.versions.get_mut(version_id) {
            Some(mut version) => {
                version.previous_version_id = None;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
