// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reattach records: the persisted handle that lets the controller rebind
//! to a still-running session after its own restart.

use crate::deployment::DeploymentId;
use crate::instance::InstanceId;
use crate::session::{RebootState, SecurityLevel};
use serde::{Deserialize, Serialize};

/// Persisted across controller restarts; cleared after a successful
/// re-attach or when the referenced process disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReattachRecord {
    pub instance: InstanceId,
    /// OS process id of the running game server.
    pub pid: u32,
    /// Opaque per-launch secret keying the bridge channel.
    pub access_identifier: String,
    pub port: u16,
    /// Which staging directory the session was launched from.
    pub primary_dir: bool,
    pub deployment: DeploymentId,
    pub reboot_state: RebootState,
    pub security_level: SecurityLevel,
}

#[cfg(test)]
#[path = "reattach_tests.rs"]
mod tests;
