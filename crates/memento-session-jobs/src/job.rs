// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The durable unit of work a session's checkpoint request becomes once
//! it's handed off from the in-memory KV session state to a relational
//! table that survives a process restart (spec §4.10).

use chrono::{DateTime, Utc};
use memento_types::{CheckpointReason, EntityId, JobId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    ManualIntervention,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::ManualIntervention => "manual_intervention",
        }
    }
}

/// Deserialized shape of [`SessionCheckpointJob::payload`]; the column
/// itself is stored as opaque JSONB so the table schema never has to
/// change when checkpoint inputs grow a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointJobPayload {
    pub seed_entities: Vec<EntityId>,
    pub reason: CheckpointReason,
    pub hops: u32,
    pub description: Option<String>,
    #[serde(default)]
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckpointJob {
    pub job_id: JobId,
    pub session_id: SessionId,
    pub payload: Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionCheckpointJob {
    pub fn new(session_id: SessionId, payload: CheckpointJobPayload) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(Uuid::new_v4().to_string()),
            session_id,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            queued_at: now,
            updated_at: now,
        }
    }
}
