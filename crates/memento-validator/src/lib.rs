// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Temporal history validator: pages through every entity's version
//! timeline looking for broken `previous_version_id` links, and
//! optionally repairs them (spec §4.11).

pub mod service;

pub use service::{validate, IssueType, ValidateOptions, ValidateReport, ValidationIssue};
