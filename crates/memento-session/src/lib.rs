// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Ephemeral multi-agent session lifecycle, events, and pub/sub over the
//! KV store (spec §4.9).

pub mod service;

pub use service::{CheckpointOptions, CreateSessionOptions, SessionManager, SessionMessage};
