// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment records: the result of compiling an instance's repository
//! at a specific revision.

use crate::session::SecurityLevel;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a deployment (one compile job result).
    pub struct DeploymentId("dep-");
}

/// A provisional merge of an external change onto the working revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMerge {
    /// Pull-request number on the origin.
    pub number: u64,
    /// Explicit revision to merge; `None` means the fetched branch tip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub merged_by: String,
    pub merged_at_ms: u64,
}

/// Revision metadata captured when a deployment is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInformation {
    /// Head SHA of the working tree that was compiled.
    pub sha: String,
    /// SHA of the tracked origin reference at compile time.
    pub origin_sha: String,
    #[serde(default)]
    pub active_test_merges: Vec<TestMerge>,
}

/// One compile job result, addressable by revision.
///
/// Artifacts live in two parallel staging directories (primary and
/// secondary) so the watchdog can hot-swap between them without copying
/// while a session is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub revision: RevisionInformation,
    /// Floor for the session security level when this deployment is live.
    pub minimum_security: SecurityLevel,
    /// Compiler toolchain version that produced the artifacts.
    pub toolchain_version: String,
    /// Artifact file name (e.g. `station.dmb`), relative to a staging dir.
    pub artifact: String,
    pub created_at_ms: u64,
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod tests;
