// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance records and the explicit update change-record.
//!
//! An instance is one game-server deployment unit: a directory tree, a
//! repository, a toolchain cache, deployment artifacts, and a supervised
//! process. The record here is what persists; the live composite lives in
//! `gk-daemon`.

use crate::rights::InstanceUserRights;
use crate::session::LaunchParameters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// File left behind by detach; its presence authorises re-attach.
pub const ATTACH_SENTINEL: &str = "ALLOW_INSTANCE_ATTACH";

crate::define_id! {
    /// Unique identifier for an instance.
    pub struct InstanceId("ins-");
}

/// Repository settings owned by an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Identity used for merge commits and synchronize pushes.
    pub committer_name: String,
    pub committer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Push synchronized commits back to the tracked branch.
    #[serde(default)]
    pub push_test_merge_commits: bool,
}

/// Compiler/deployment settings owned by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Project name; the compiler produces `<project>.dmb`.
    pub project_name: String,
    pub toolchain_version: String,
    /// Floor for the session security level once a deployment built with
    /// these settings is live.
    pub minimum_security: crate::session::SecurityLevel,
    /// Seconds a compile may run before the job errors.
    pub compile_timeout_secs: u64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            project_name: "game".to_string(),
            toolchain_version: String::new(),
            minimum_security: crate::session::SecurityLevel::Ultrasafe,
            compile_timeout_secs: 1800,
        }
    }
}

/// Chat-bot connection settings. Provider payload is opaque to the core;
/// the named provider adapter interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub name: String,
    pub provider: String,
    pub enabled: bool,
    /// Channel identifiers tagged by class, e.g. `{"watchdog": ["#ops"]}`.
    #[serde(default)]
    pub channels: HashMap<String, Vec<String>>,
}

/// Persistent record of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    /// Unique canonical name.
    pub name: String,
    /// Unique absolute path; never inside the install directory nor any
    /// other instance.
    pub path: PathBuf,
    pub online: bool,
    /// Launch the watchdog when the instance comes online (suppressed for
    /// the first online after a relocation).
    pub autostart: bool,
    pub auto_update: bool,
    pub repository: RepositorySettings,
    pub launch: LaunchParameters,
    pub deploy: DeploySettings,
    #[serde(default)]
    pub chat: Vec<ChatSettings>,
    /// user name → rights on this instance.
    #[serde(default)]
    pub rights: HashMap<String, InstanceUserRights>,
}

impl Instance {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: InstanceId::generate(),
            name: name.into(),
            path,
            online: false,
            autostart: false,
            auto_update: false,
            repository: RepositorySettings::default(),
            launch: LaunchParameters::default(),
            deploy: DeploySettings::default(),
            chat: Vec::new(),
            rights: HashMap::new(),
        }
    }

    pub fn rights_for(&self, user: &str) -> InstanceUserRights {
        self.rights.get(user).cloned().unwrap_or_default()
    }
}

/// Explicit change-record for instance updates.
///
/// Absent fields are untouched; in particular `online: None` means
/// "ignore", never "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autostart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositorySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeploySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<Vec<ChatSettings>>,
}

impl InstanceUpdate {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self == &InstanceUpdate::default()
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
