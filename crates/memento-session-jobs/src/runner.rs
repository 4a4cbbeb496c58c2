// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Boot-time reconciliation and steady-state draining of the session
//! checkpoint job queue (spec §4.10). Jobs left `running` when the
//! process last exited are assumed orphaned by a crash and requeued
//! before any new work is drained.

use std::sync::Arc;

use memento_entity::EntityService;
use memento_history::CheckpointStore;
use memento_relationship::RelationshipService;
use memento_session::{CheckpointOptions, SessionManager};
use memento_types::{CheckpointId, MementoError, Result};

use crate::job::{CheckpointJobPayload, SessionCheckpointJob};
use crate::store::SessionJobStore;

pub struct SessionJobRunner {
    jobs: Arc<SessionJobStore>,
    checkpoints: Arc<CheckpointStore>,
    entities: Arc<EntityService>,
    relationships: Arc<RelationshipService>,
    sessions: Arc<SessionManager>,
}

impl SessionJobRunner {
    pub fn new(
        jobs: Arc<SessionJobStore>,
        checkpoints: Arc<CheckpointStore>,
        entities: Arc<EntityService>,
        relationships: Arc<RelationshipService>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            jobs,
            checkpoints,
            entities,
            relationships,
            sessions,
        }
    }

    /// Requeues jobs stuck `running` from a prior crash. Call once at
    /// process startup, before `drain_once`.
    pub async fn reconcile_on_boot(&self) -> Result<usize> {
        let orphaned = self.jobs.load_orphaned(10_000).await?;
        let count = orphaned.len();
        for mut job in orphaned {
            tracing::warn!(job_id = %job.job_id, "requeuing orphaned session checkpoint job");
            self.jobs.requeue(&mut job).await?;
        }
        Ok(count)
    }

    fn execute(&self, job: &SessionCheckpointJob) -> Result<CheckpointId> {
        let payload: CheckpointJobPayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| MementoError::Internal(e.to_string()))?;
        let record = self.checkpoints.create_checkpoint(
            &self.entities,
            &self.relationships,
            payload.seed_entities,
            payload.reason,
            payload.hops,
            payload.description,
            payload.window,
        )?;
        Ok(record.id)
    }

    /// Drains up to `batch` queued jobs, running each to completion
    /// in-line. Returns the number successfully completed.
    pub async fn drain_once(&self, batch: i64) -> Result<usize> {
        let pending = self.jobs.load_pending(batch).await?;
        let mut completed = 0;
        for mut job in pending {
            self.jobs.mark_running(&mut job).await?;
            match self.execute(&job) {
                Ok(checkpoint_id) => {
                    self.jobs.mark_completed(&mut job).await?;
                    self.jobs.delete(&job.job_id).await?;
                    if let Err(e) = self
                        .sessions
                        .checkpoint(&job.session_id, checkpoint_id, CheckpointOptions::default())
                        .await
                    {
                        tracing::warn!(job_id = %job.job_id, error = %e, "session checkpoint pointer update failed after job completion");
                    }
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.job_id, error = %e, "session checkpoint job failed");
                    self.jobs.mark_failed(&mut job, e.to_string()).await?;
                }
            }
        }
        Ok(completed)
    }
}
