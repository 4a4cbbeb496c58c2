// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Durable session-checkpoint job queue: a relational table that
//! survives a process restart, with boot-time reconciliation of jobs
//! orphaned by a prior crash (spec §4.10).

pub mod job;
pub mod runner;
pub mod store;

pub use job::{CheckpointJobPayload, JobStatus, SessionCheckpointJob};
pub use runner::SessionJobRunner;
pub use store::SessionJobStore;
