// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Task payload carried through the ingestion queue.

use chrono::{DateTime, Utc};
use memento_types::TaskId;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    EntityUpsert,
    RelationshipUpsert,
    Embedding,
    Parse,
}

#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub id: TaskId,
    pub task_type: TaskType,
    pub priority: u8,
    pub data: Value,
    pub metadata: Value,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub partition_key: Option<String>,
}

impl TaskPayload {
    pub fn new(task_type: TaskType, priority: u8, data: Value) -> Self {
        Self {
            id: TaskId::new(Uuid::new_v4().to_string()),
            task_type,
            priority: priority.clamp(1, 10),
            data,
            metadata: Value::Null,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            scheduled_at: None,
            partition_key: None,
        }
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
