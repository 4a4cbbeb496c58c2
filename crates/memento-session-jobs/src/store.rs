// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Relational persistence for [`SessionCheckpointJob`] rows. DDL and
//! query shapes live here rather than in the storage crate's generic
//! `RelationalStore::setup_schema`, which is intentionally a no-op for
//! the production adapter (spec §4.10).

use std::sync::Arc;

use memento_storage::{QueryOptions, RelationalStore};
use memento_types::{JobId, MementoError, Result};
use serde_json::Value;

use crate::job::{JobStatus, SessionCheckpointJob};

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS session_checkpoint_jobs (
    job_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    payload JSONB NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    queued_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)";

const CREATE_INDEX_SQL: &str = "\
CREATE INDEX IF NOT EXISTS session_checkpoint_jobs_status_queued_at_idx
    ON session_checkpoint_jobs (status, queued_at)";

const UPSERT_SQL: &str = "\
INSERT INTO session_checkpoint_jobs
    (job_id, session_id, payload, status, attempts, last_error, queued_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (job_id) DO UPDATE SET
    status = EXCLUDED.status,
    attempts = EXCLUDED.attempts,
    last_error = EXCLUDED.last_error,
    updated_at = EXCLUDED.updated_at";

const SELECT_BY_STATUS_SQL: &str =
    "SELECT * FROM session_checkpoint_jobs WHERE status = $1 ORDER BY queued_at ASC LIMIT $2";

const DELETE_SQL: &str = "DELETE FROM session_checkpoint_jobs WHERE job_id = $1";

fn row_to_job(row: memento_storage::RelationalRow) -> Result<SessionCheckpointJob> {
    serde_json::from_value(Value::Object(row.0)).map_err(|e| MementoError::Internal(e.to_string()))
}

pub struct SessionJobStore {
    relational: Arc<dyn RelationalStore>,
    max_retries: u32,
}

impl SessionJobStore {
    pub fn new(relational: Arc<dyn RelationalStore>, max_retries: u32) -> Self {
        Self {
            relational,
            max_retries,
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        self.relational
            .query(CREATE_TABLE_SQL, vec![], QueryOptions::default())
            .await?;
        self.relational
            .query(CREATE_INDEX_SQL, vec![], QueryOptions::default())
            .await?;
        Ok(())
    }

    pub async fn upsert(&self, job: &SessionCheckpointJob) -> Result<()> {
        let params = vec![
            Value::String(job.job_id.to_string()),
            Value::String(job.session_id.to_string()),
            job.payload.clone(),
            Value::String(job.status.as_str().to_string()),
            Value::from(job.attempts),
            job.last_error.clone().map(Value::String).unwrap_or(Value::Null),
            Value::String(job.queued_at.to_rfc3339()),
            Value::String(job.updated_at.to_rfc3339()),
        ];
        self.relational
            .query(UPSERT_SQL, params, QueryOptions::default())
            .await?;
        Ok(())
    }

    async fn select_by_status(&self, status: JobStatus, limit: i64) -> Result<Vec<SessionCheckpointJob>> {
        let rows = self
            .relational
            .query(
                SELECT_BY_STATUS_SQL,
                vec![Value::String(status.as_str().to_string()), Value::from(limit)],
                QueryOptions::default(),
            )
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn load_pending(&self, limit: i64) -> Result<Vec<SessionCheckpointJob>> {
        self.select_by_status(JobStatus::Queued, limit).await
    }

    /// Jobs left `running` across a process restart; the caller should
    /// requeue these before draining pending work.
    pub async fn load_orphaned(&self, limit: i64) -> Result<Vec<SessionCheckpointJob>> {
        self.select_by_status(JobStatus::Running, limit).await
    }

    pub async fn load_dead_letters(&self, limit: i64) -> Result<Vec<SessionCheckpointJob>> {
        self.select_by_status(JobStatus::ManualIntervention, limit).await
    }

    pub async fn delete(&self, job_id: &JobId) -> Result<()> {
        self.relational
            .query(DELETE_SQL, vec![Value::String(job_id.to_string())], QueryOptions::default())
            .await?;
        Ok(())
    }

    pub async fn mark_running(&self, job: &mut SessionCheckpointJob) -> Result<()> {
        job.status = JobStatus::Running;
        job.updated_at = chrono::Utc::now();
        self.upsert(job).await
    }

    pub async fn mark_completed(&self, job: &mut SessionCheckpointJob) -> Result<()> {
        job.status = JobStatus::Completed;
        job.updated_at = chrono::Utc::now();
        self.upsert(job).await
    }

    /// Escalates to `manual_intervention` once `attempts` reaches
    /// `max_retries`; otherwise requeues.
    pub async fn mark_failed(&self, job: &mut SessionCheckpointJob, error: impl Into<String>) -> Result<()> {
        job.attempts += 1;
        job.last_error = Some(error.into());
        job.updated_at = chrono::Utc::now();
        job.status = if job.attempts >= self.max_retries {
            JobStatus::ManualIntervention
        } else {
            JobStatus::Queued
        };
        self.upsert(job).await
    }

    pub async fn requeue(&self, job: &mut SessionCheckpointJob) -> Result<()> {
        job.status = JobStatus::Queued;
        job.updated_at = chrono::Utc::now();
        self.upsert(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CheckpointJobPayload;
    use async_trait::async_trait;
    use memento_storage::{HealthStatus, TransactionOptions};
    use memento_types::{CheckpointReason, SessionId};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Test double that actually interprets the store's fixed SQL shapes
    /// rather than ignoring them, so store-level logic (status filtering,
    /// upsert-by-id) is genuinely exercised.
    #[derive(Default)]
    struct FakeRelationalStore {
        rows: Mutex<HashMap<String, Value>>,
    }

    #[async_trait]
    impl RelationalStore for FakeRelationalStore {
        async fn query(
            &self,
            sql: &str,
            params: Vec<Value>,
            _options: QueryOptions,
        ) -> Result<Vec<memento_storage::RelationalRow>> {
            if sql.starts_with("CREATE") {
                return Ok(vec![]);
            }
            if sql.starts_with("INSERT INTO") {
                let job_id = params[0].as_str().unwrap_or_default().to_string();
                self.rows.lock().insert(job_id, Value::Array(params));
                return Ok(vec![]);
            }
            if sql.starts_with("SELECT") {
                let status = params[0].as_str().unwrap_or_default();
                let rows = self.rows.lock();
                let matched: Vec<_> = rows
                    .values()
                    .filter(|row| row[3].as_str() == Some(status))
                    .map(|row| {
                        let mut map = serde_json::Map::new();
                        map.insert("job_id".into(), row[0].clone());
                        map.insert("session_id".into(), row[1].clone());
                        map.insert("payload".into(), row[2].clone());
                        map.insert("status".into(), row[3].clone());
                        map.insert("attempts".into(), row[4].clone());
                        map.insert("last_error".into(), row[5].clone());
                        map.insert("queued_at".into(), row[6].clone());
                        map.insert("updated_at".into(), row[7].clone());
                        memento_storage::RelationalRow(map)
                    })
                    .collect();
                return Ok(matched);
            }
            if sql.starts_with("DELETE") {
                let job_id = params[0].as_str().unwrap_or_default();
                self.rows.lock().remove(job_id);
                return Ok(vec![]);
            }
            Ok(vec![])
        }

        async fn transaction(&self, _statements: Vec<(String, Vec<Value>)>, _options: TransactionOptions) -> Result<()> {
            Ok(())
        }

        async fn bulk_query(&self, _statements: Vec<(String, Vec<Value>)>) -> Result<Vec<Vec<memento_storage::RelationalRow>>> {
            Ok(vec![])
        }

        async fn setup_schema(&self) -> Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> Result<HealthStatus> {
            Ok(HealthStatus::Healthy)
        }
    }

    fn payload() -> CheckpointJobPayload {
        CheckpointJobPayload {
            seed_entities: vec![],
            reason: CheckpointReason::Manual,
            hops: 2,
            description: None,
            window: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_load_pending_round_trips() {
        let store = SessionJobStore::new(Arc::new(FakeRelationalStore::default()), 3);
        store.initialize().await.unwrap();
        let job = SessionCheckpointJob::new(SessionId::new("s-1"), payload());
        store.upsert(&job).await.unwrap();

        let pending = store.load_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, job.job_id);
    }

    #[tokio::test]
    async fn mark_failed_escalates_to_manual_intervention_past_max_retries() {
        let store = SessionJobStore::new(Arc::new(FakeRelationalStore::default()), 1);
        let mut job = SessionCheckpointJob::new(SessionId::new("s-1"), payload());
        store.mark_failed(&mut job, "boom").await.unwrap();

        let dead_letters = store.load_dead_letters(10).await.unwrap();
        assert_eq!(dead_letters.len(), 1);
        assert_eq!(dead_letters[0].last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn delete_removes_job() {
        let store = SessionJobStore::new(Arc::new(FakeRelationalStore::default()), 3);
        let job = SessionCheckpointJob::new(SessionId::new("s-1"), payload());
        store.upsert(&job).await.unwrap();
        store.delete(&job.job_id).await.unwrap();
        assert_eq!(store.load_pending(10).await.unwrap().len(), 0);
    }
}
