// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Worker pool that drains the queue manager and dispatches tasks to
//! type-registered handlers, with simple auto-scaling and health tracking
//! (spec §4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memento_types::{MementoError, Result};
use parking_lot::RwLock;

use crate::queue::QueueManager;
use crate::task::{TaskPayload, TaskType};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskPayload) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ScalingRules {
    pub scale_up_threshold: usize,
    pub scale_down_threshold: usize,
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
}

impl Default for ScalingRules {
    fn default() -> Self {
        Self {
            scale_up_threshold: 1000,
            scale_down_threshold: 50,
            scale_up_cooldown: Duration::from_secs(30),
            scale_down_cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub min_workers: u32,
    pub max_workers: u32,
    pub worker_timeout: Duration,
    pub restart_threshold: u32,
    pub auto_scale: bool,
    pub scaling_rules: ScalingRules,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 16,
            worker_timeout: Duration::from_secs(30),
            restart_threshold: 5,
            auto_scale: true,
            scaling_rules: ScalingRules::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkerHealth {
    pub tasks_processed: AtomicU64,
    pub failed_tasks: AtomicU32,
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    handlers: RwLock<HashMap<TaskType, Arc<dyn TaskHandler>>>,
    active_workers: std::sync::atomic::AtomicU32,
    health: RwLock<Vec<Arc<WorkerHealth>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let health = (0..config.min_workers)
            .map(|_| Arc::new(WorkerHealth::default()))
            .collect();
        Self {
            active_workers: std::sync::atomic::AtomicU32::new(config.min_workers),
            config,
            handlers: RwLock::new(HashMap::new()),
            health: RwLock::new(health),
        }
    }

    pub fn register_handler(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(task_type, handler);
    }

    pub fn active_worker_count(&self) -> u32 {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Runs `task` against its registered handler, enforcing `worker_timeout`.
    /// On timeout or handler failure, requeues the task unless retries are
    /// exhausted (the queue manager itself drops exhausted tasks).
    pub async fn execute_task(&self, queue: &QueueManager, task: TaskPayload, worker_index: usize) {
        let handler = self.handlers.read().get(&task.task_type).cloned();
        let Some(handler) = handler else {
            tracing::error!(task_id = %task.id, task_type = ?task.task_type, "no handler registered for task type");
            queue.requeue_task(task, Some("NoHandler"));
            return;
        };

        let result = tokio::time::timeout(self.config.worker_timeout, handler.handle(&task)).await;
        let health = self.health.read().get(worker_index).cloned();

        match result {
            Ok(Ok(())) => {
                if let Some(health) = health {
                    health.tasks_processed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(Err(e)) => {
                if let Some(health) = &health {
                    health.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }
                self.maybe_restart_worker(worker_index, &health);
                queue.requeue_task(task, Some(&e.to_string()));
            }
            Err(_) => {
                if let Some(health) = &health {
                    health.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }
                self.maybe_restart_worker(worker_index, &health);
                queue.requeue_task(task, Some("worker timeout"));
            }
        }
    }

    fn maybe_restart_worker(&self, worker_index: usize, health: &Option<Arc<WorkerHealth>>) {
        if let Some(health) = health {
            if health.failed_tasks.load(Ordering::Relaxed) >= self.config.restart_threshold {
                tracing::warn!(worker_index, "restarting worker past failure threshold");
                let mut workers = self.health.write();
                if worker_index < workers.len() {
                    workers[worker_index] = Arc::new(WorkerHealth::default());
                }
            }
        }
    }

    /// Scales workers based on queue depth, clamped to `[min_workers,
    /// max_workers]`. Cooldowns are the caller's responsibility (this
    /// service is invoked on a timer by the ingestion pipeline facade).
    pub fn maybe_scale(&self, queue_depth: usize) -> u32 {
        if !self.config.auto_scale {
            return self.active_worker_count();
        }
        let current = self.active_worker_count();
        let target = if queue_depth > self.config.scaling_rules.scale_up_threshold {
            (current + 1).min(self.config.max_workers)
        } else if queue_depth < self.config.scaling_rules.scale_down_threshold {
            current.saturating_sub(1).max(self.config.min_workers)
        } else {
            current
        };

        if target != current {
            self.active_workers.store(target, Ordering::Relaxed);
            let mut workers = self.health.write();
            workers.resize_with(target as usize, || Arc::new(WorkerHealth::default()));
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use serde_json::Value;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(&self, _task: &TaskPayload) -> Result<()> {
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn handle(&self, _task: &TaskPayload) -> Result<()> {
            Err(MementoError::Internal("boom".into()))
        }
    }

    #[tokio::test]
    async fn unregistered_task_type_requeues_with_no_handler() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let queue = QueueManager::new(QueueConfig::default());
        let task = TaskPayload::new(TaskType::Embedding, 5, Value::Null);
        pool.execute_task(&queue, task, 0).await;
        assert_eq!(queue.dequeue_by_priority(10).len(), 0); // requeued to scheduled, not active
    }

    #[tokio::test]
    async fn failing_handler_increments_failed_tasks_and_requeues() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        pool.register_handler(TaskType::Parse, Arc::new(FailingHandler));
        let queue = QueueManager::new(QueueConfig::default());
        let task = TaskPayload::new(TaskType::Parse, 5, Value::Null).with_max_retries(5);
        pool.execute_task(&queue, task, 0).await;
        assert_eq!(pool.health.read()[0].failed_tasks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn maybe_scale_adds_workers_above_threshold() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            min_workers: 2,
            max_workers: 4,
            ..Default::default()
        });
        let scaled = pool.maybe_scale(5000);
        assert_eq!(scaled, 3);
    }
}
