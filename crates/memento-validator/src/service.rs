// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Scans every entity's version timeline looking for broken
//! `previous_version_id` links and, optionally, repairs them (spec
//! §4.11).

use memento_entity::EntityService;
use memento_history::VersionStore;
use memento_types::{EntityFilter, EntityId, OrderDirection, Page, Result, VersionId};

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub batch_size: usize,
    pub max_entities: Option<usize>,
    pub timeline_limit: usize,
    pub auto_repair: bool,
    pub dry_run: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_entities: None,
            timeline_limit: 200,
            auto_repair: false,
            dry_run: false,
        }
    }
}

impl ValidateOptions {
    fn normalized(&self) -> Self {
        Self {
            batch_size: self.batch_size.clamp(1, 100),
            max_entities: self.max_entities,
            timeline_limit: self.timeline_limit.clamp(10, 200),
            auto_repair: self.auto_repair,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    UnexpectedHead,
    MissingPrevious,
    MisorderedPrevious,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub entity_id: EntityId,
    pub version_id: VersionId,
    pub issue_type: IssueType,
    pub expected_previous_id: Option<VersionId>,
    pub actual_previous_id: Option<VersionId>,
    pub message: Option<String>,
    pub repaired: Option<bool>,
}

#[derive(Debug, Default, Clone)]
pub struct ValidateReport {
    pub scanned_entities: usize,
    pub inspected_versions: usize,
    pub repaired_links: usize,
    pub issues: Vec<ValidationIssue>,
}

pub fn validate(entities: &EntityService, versions: &VersionStore, options: ValidateOptions) -> Result<ValidateReport> {
    let options = options.normalized();
    let mut report = ValidateReport::default();
    let mut cursor = None;

    'paging: loop {
        let page = Page {
            limit: options.batch_size,
            offset: None,
            cursor,
            order_by: None,
            order_direction: OrderDirection::Asc,
        };
        let result = entities.list_entities(&page, &EntityFilter::default())?;
        if result.items.is_empty() {
            break;
        }

        for entity in &result.items {
            if let Some(max) = options.max_entities {
                if report.scanned_entities >= max {
                    break 'paging;
                }
            }
            report.scanned_entities += 1;

            let mut timeline = versions.timeline(&entity.id, None, None, options.timeline_limit);
            timeline.reverse(); // ascending by timestamp
            report.inspected_versions += timeline.len();

            if timeline.len() < options.timeline_limit {
                if let Some(earliest) = timeline.first() {
                    if earliest.previous_version_id.is_some() {
                        report.issues.push(ValidationIssue {
                            entity_id: entity.id.clone(),
                            version_id: earliest.id.clone(),
                            issue_type: IssueType::UnexpectedHead,
                            expected_previous_id: None,
                            actual_previous_id: earliest.previous_version_id.clone(),
                            message: Some("full history present but earliest version has a previous link".to_string()),
                            repaired: None,
                        });
                    }
                }
            }

            for pair in timeline.windows(2) {
                let [prev, current] = pair else { continue };
                let mut issue = match &current.previous_version_id {
                    None => Some(ValidationIssue {
                        entity_id: entity.id.clone(),
                        version_id: current.id.clone(),
                        issue_type: IssueType::MissingPrevious,
                        expected_previous_id: Some(prev.id.clone()),
                        actual_previous_id: None,
                        message: None,
                        repaired: None,
                    }),
                    Some(actual) if *actual != prev.id => Some(ValidationIssue {
                        entity_id: entity.id.clone(),
                        version_id: current.id.clone(),
                        issue_type: IssueType::MisorderedPrevious,
                        expected_previous_id: Some(prev.id.clone()),
                        actual_previous_id: Some(actual.clone()),
                        message: None,
                        repaired: None,
                    }),
                    Some(_) if current.timestamp < prev.timestamp => Some(ValidationIssue {
                        entity_id: entity.id.clone(),
                        version_id: current.id.clone(),
                        issue_type: IssueType::MisorderedPrevious,
                        expected_previous_id: Some(prev.id.clone()),
                        actual_previous_id: current.previous_version_id.clone(),
                        message: Some(format!(
                            "version timestamp {} precedes predecessor timestamp {}",
                            current.timestamp, prev.timestamp
                        )),
                        repaired: None,
                    }),
                    Some(_) => None,
                };

                if let Some(issue) = &mut issue {
                    if options.auto_repair && !options.dry_run && issue.issue_type == IssueType::MissingPrevious {
                        let repaired = versions.repair_previous_version_link(&current.id, prev.id.clone());
                        issue.repaired = Some(repaired);
                        if repaired {
                            report.repaired_links += 1;
                        }
                    }
                }

                if let Some(issue) = issue {
                    report.issues.push(issue);
                }
            }
        }

        cursor = result.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memento_types::{Entity, EntityKind};
    use serde_json::Map;

    fn sample_entity(id: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            path: None,
            hash: None,
            language: None,
            created: Utc::now(),
            last_modified: Utc::now(),
            metadata: Map::new(),
            kind: EntityKind::Module {
                exports: vec![],
                imports: vec![],
                dependencies: vec![],
                is_entry_point: false,
            },
        }
    }

    #[test]
    fn clean_history_produces_no_issues() {
        let entities = EntityService::new();
        let versions = VersionStore::new();
        entities.create_entity(sample_entity("a")).unwrap();
        let t0 = Utc::now();
        versions.append(&EntityId::from("a"), "h1", t0, None, None, None);
        versions.append(
            &EntityId::from("a"),
            "h2",
            t0 + chrono::Duration::seconds(10),
            None,
            None,
            None,
        );

        let report = validate(&entities, &versions, ValidateOptions::default()).unwrap();
        assert_eq!(report.scanned_entities, 1);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn misordered_previous_is_detected_but_not_auto_repaired() {
        let entities = EntityService::new();
        let versions = VersionStore::new();
        entities.create_entity(sample_entity("a")).unwrap();
        let t0 = Utc::now();
        let first = versions.append(&EntityId::from("a"), "h1", t0, None, None, None);
        let second = versions.append(
            &EntityId::from("a"),
            "h2",
            t0 + chrono::Duration::seconds(10),
            None,
            None,
            None,
        );
        // Simulate corruption: point the link at a version that isn't the predecessor.
        versions.repair_previous_version_link(&second.id, VersionId::new("bogus"));
        let broken = versions.timeline(&EntityId::from("a"), None, None, 10);
        assert_ne!(broken[0].previous_version_id, Some(first.id.clone()));

        let report = validate(
            &entities,
            &versions,
            ValidateOptions {
                auto_repair: true,
                ..ValidateOptions::default()
            },
        )
        .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].issue_type, IssueType::MisorderedPrevious);
        // Only `MissingPrevious` is auto-repaired; a misordered link is left alone.
        assert_eq!(report.issues[0].repaired, None);
        assert_eq!(report.repaired_links, 0);
    }

    #[test]
    fn missing_previous_is_detected_and_repaired_when_requested() {
        let entities = EntityService::new();
        let versions = VersionStore::new();
        entities.create_entity(sample_entity("a")).unwrap();
        let t0 = Utc::now();
        let first = versions.append(&EntityId::from("a"), "h1", t0, None, None, None);
        let second = versions.append(
            &EntityId::from("a"),
            "h2",
            t0 + chrono::Duration::seconds(10),
            None,
            None,
            None,
        );
        // Simulate corruption: drop the link entirely rather than misdirecting it.
        versions.clear_previous_version_link(&second.id);
        let broken = versions.timeline(&EntityId::from("a"), None, None, 10);
        assert_eq!(broken[0].previous_version_id, None);

        let report = validate(
            &entities,
            &versions,
            ValidateOptions {
                auto_repair: true,
                ..ValidateOptions::default()
            },
        )
        .unwrap();

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].issue_type, IssueType::MissingPrevious);
        assert_eq!(report.issues[0].repaired, Some(true));
        assert_eq!(report.repaired_links, 1);

        let repaired = versions.timeline(&EntityId::from("a"), None, None, 10);
        assert_eq!(repaired[0].previous_version_id, Some(first.id.clone()));
    }

    #[test]
    fn max_entities_bounds_the_scan() {
        let entities = EntityService::new();
        let versions = VersionStore::new();
        for id in ["a", "b", "c"] {
            entities.create_entity(sample_entity(id)).unwrap();
            versions.append(&EntityId::from(id), "h1", Utc::now(), None, None, None);
        }

        let report = validate(
            &entities,
            &versions,
            ValidateOptions {
                max_entities: Some(2),
                batch_size: 1,
                ..ValidateOptions::default()
            },
        )
        .unwrap();
        assert_eq!(report.scanned_entities, 2);
    }
}
