// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Partitioned task queue with backpressure, requeue backoff, and
//! scheduled-task promotion (spec §4.8).

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use memento_types::{MementoError, Result};
use parking_lot::Mutex;
use rand::Rng;

use crate::task::TaskPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    RoundRobin,
    Hash,
    Priority,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub partitions: usize,
    pub max_size_per_partition: usize,
    pub backpressure_threshold: usize,
    pub strategy: PartitionStrategy,
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            max_size_per_partition: 10_000,
            backpressure_threshold: 50_000,
            strategy: PartitionStrategy::RoundRobin,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub queue_depth: usize,
    pub oldest_event_age: Option<Duration>,
    pub partition_lag: Vec<(usize, usize)>,
}

struct Partition {
    // Priority (1..=10) ordered highest-first; FIFO within a priority.
    buckets: Vec<VecDeque<TaskPayload>>,
}

impl Partition {
    fn new() -> Self {
        Self {
            buckets: (0..10).map(|_| VecDeque::new()).collect(),
        }
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    fn push(&mut self, task: TaskPayload) {
        let idx = (task.priority.clamp(1, 10) - 1) as usize;
        self.buckets[idx].push_back(task);
    }

    fn pop(&mut self) -> Option<TaskPayload> {
        for bucket in self.buckets.iter_mut().rev() {
            if let Some(task) = bucket.pop_front() {
                return Some(task);
            }
        }
        None
    }

    fn oldest_created_at(&self) -> Option<DateTime<Utc>> {
        self.buckets
            .iter()
            .filter_map(|b| b.front())
            .map(|t| t.created_at)
            .min()
    }
}

pub struct QueueManager {
    config: QueueConfig,
    partitions: Vec<Mutex<Partition>>,
    scheduled: Mutex<Vec<TaskPayload>>,
    round_robin_cursor: Mutex<usize>,
    dropped: Mutex<Vec<TaskPayload>>,
}

impl QueueManager {
    pub fn new(config: QueueConfig) -> Self {
        let partitions = (0..config.partitions.max(1))
            .map(|_| Mutex::new(Partition::new()))
            .collect();
        Self {
            config,
            partitions,
            scheduled: Mutex::new(Vec::new()),
            round_robin_cursor: Mutex::new(0),
            dropped: Mutex::new(Vec::new()),
        }
    }

    fn total_depth(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().len()).sum()
    }

    fn select_partition(&self, task: &TaskPayload) -> usize {
        let n = self.partitions.len();
        match self.config.strategy {
            PartitionStrategy::RoundRobin => {
                let mut cursor = self.round_robin_cursor.lock();
                let chosen = *cursor % n;
                *cursor = (*cursor + 1) % n;
                chosen
            }
            PartitionStrategy::Hash => {
                let key = task.partition_key.as_deref().unwrap_or(task.id.as_str());
                let mut hash: u64 = 0xcbf29ce484222325;
                for byte in key.bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(0x100000001b3);
                }
                (hash as usize) % n
            }
            PartitionStrategy::Priority => {
                // High priority routes to lower-indexed partitions.
                let bucket_span = (n as f32 / 10.0).max(1.0);
                (((10 - task.priority) as f32 * bucket_span) as usize).min(n - 1)
            }
        }
    }

    pub fn enqueue(&self, task: TaskPayload) -> Result<usize> {
        if self.total_depth() >= self.config.backpressure_threshold {
            return Err(MementoError::QueueOverflow {
                partition: "total".to_string(),
                current: self.total_depth(),
                limit: self.config.backpressure_threshold,
            });
        }

        let partition_id = self.select_partition(&task);
        let mut partition = self.partitions[partition_id].lock();
        if partition.len() >= self.config.max_size_per_partition {
            return Err(MementoError::QueueOverflow {
                partition: partition_id.to_string(),
                current: partition.len(),
                limit: self.config.max_size_per_partition,
            });
        }
        partition.push(task);
        Ok(partition_id)
    }

    pub fn dequeue_batch(&self, partition_id: Option<usize>, batch_size: usize) -> Vec<TaskPayload> {
        let mut out = Vec::with_capacity(batch_size);
        match partition_id {
            Some(pid) if pid < self.partitions.len() => {
                let mut partition = self.partitions[pid].lock();
                while out.len() < batch_size {
                    match partition.pop() {
                        Some(task) => out.push(task),
                        None => break,
                    }
                }
            }
            _ => {
                let n = self.partitions.len();
                let mut idx = 0;
                while out.len() < batch_size {
                    let mut progressed = false;
                    for i in 0..n {
                        if out.len() >= batch_size {
                            break;
                        }
                        let mut partition = self.partitions[(idx + i) % n].lock();
                        if let Some(task) = partition.pop() {
                            out.push(task);
                            progressed = true;
                        }
                    }
                    idx = (idx + 1) % n;
                    if !progressed {
                        break;
                    }
                }
            }
        }
        out
    }

    pub fn dequeue_by_priority(&self, max: usize) -> Vec<TaskPayload> {
        let mut all: Vec<(usize, TaskPayload)> = Vec::new();
        for (pid, partition) in self.partitions.iter().enumerate() {
            let mut guard = partition.lock();
            while let Some(task) = guard.pop() {
                all.push((pid, task));
            }
        }
        all.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then(a.1.created_at.cmp(&b.1.created_at)));

        let mut taken = Vec::with_capacity(max);
        for (_, task) in all.drain(..all.len().min(max)) {
            taken.push(task);
        }
        // Push back whatever wasn't taken.
        for (pid, task) in all {
            self.partitions[pid].lock().push(task);
        }
        taken
    }

    /// Increments `retry_count` and schedules the next attempt with
    /// exponential backoff + jitter, clamped to 60s. Drops (and logs) tasks
    /// whose `retry_count` has reached `max_retries`.
    pub fn requeue_task(&self, mut task: TaskPayload, error: Option<&str>) {
        task.retry_count += 1;
        if task.retry_count >= task.max_retries {
            tracing::warn!(task_id = %task.id, error, "dropping task after exhausting retries");
            self.dropped.lock().push(task);
            return;
        }

        let base = self.config.retry_delay.as_millis() as f64 * 2f64.powi(task.retry_count as i32);
        let jitter_fraction = rand::thread_rng().gen_range(-0.25..=0.25);
        let with_jitter = (base * (1.0 + jitter_fraction)).max(0.0);
        let delay_ms = with_jitter.min(60_000.0) as i64;

        task.scheduled_at = Some(Utc::now() + chrono::Duration::milliseconds(delay_ms));
        self.scheduled.lock().push(task);
    }

    /// Promotes scheduled tasks whose `scheduled_at` has passed back into
    /// the active partitions.
    pub fn process_scheduled_tasks(&self) -> usize {
        let now = Utc::now();
        let mut scheduled = self.scheduled.lock();
        let (due, pending): (Vec<_>, Vec<_>) = scheduled
            .drain(..)
            .partition(|t| t.scheduled_at.map(|s| s <= now).unwrap_or(true));
        *scheduled = pending;
        drop(scheduled);

        let count = due.len();
        for task in due {
            let _ = self.enqueue(task);
        }
        count
    }

    pub fn metrics(&self) -> QueueMetrics {
        let partition_lag: Vec<(usize, usize)> = self
            .partitions
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.lock().len()))
            .collect();
        let oldest_event_age = self
            .partitions
            .iter()
            .filter_map(|p| p.lock().oldest_created_at())
            .min()
            .map(|t| (Utc::now() - t).to_std().unwrap_or_default());

        QueueMetrics {
            queue_depth: partition_lag.iter().map(|(_, n)| n).sum(),
            oldest_event_age,
            partition_lag,
        }
    }

    pub fn dropped_tasks(&self) -> Vec<TaskPayload> {
        self.dropped.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn task(priority: u8) -> TaskPayload {
        crate::task::TaskPayload::new(crate::task::TaskType::Parse, priority, Value::Null)
    }

    #[test]
    fn enqueue_fails_with_overflow_past_backpressure_threshold() {
        let manager = QueueManager::new(QueueConfig {
            backpressure_threshold: 1,
            ..Default::default()
        });
        manager.enqueue(task(5)).unwrap();
        let err = manager.enqueue(task(5)).unwrap_err();
        assert!(matches!(err, MementoError::QueueOverflow { .. }));
    }

    #[test]
    fn dequeue_by_priority_orders_highest_first() {
        let manager = QueueManager::new(QueueConfig::default());
        manager.enqueue(task(3)).unwrap();
        manager.enqueue(task(9)).unwrap();
        manager.enqueue(task(5)).unwrap();
        let batch = manager.dequeue_by_priority(10);
        assert_eq!(batch[0].priority, 9);
        assert_eq!(batch[1].priority, 5);
        assert_eq!(batch[2].priority, 3);
    }

    #[test]
    fn requeue_drops_task_once_max_retries_reached() {
        let manager = QueueManager::new(QueueConfig::default());
        let mut t = task(5).with_max_retries(1);
        t.retry_count = 0;
        manager.requeue_task(t, Some("boom"));
        assert_eq!(manager.dropped_tasks().len(), 1);
    }

    #[test]
    fn process_scheduled_tasks_promotes_due_tasks() {
        let manager = QueueManager::new(QueueConfig {
            retry_delay: Duration::from_millis(0),
            ..Default::default()
        });
        let t = task(5);
        manager.requeue_task(t, None);
        std::thread::sleep(Duration::from_millis(5));
        let promoted = manager.process_scheduled_tasks();
        assert_eq!(promoted, 1);
        assert_eq!(manager.total_depth(), 1);
    }
}
