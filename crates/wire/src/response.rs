// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTO structs serialised by the HTTP adapter.
//!
//! Verbs per concept: `PUT` create, `POST` update, `GET` read,
//! `GET /List` enumerate, `DELETE` remove, `PATCH` refresh/restart.
//! Long-running operations answer 202 with a [`JobResponse`] body.

use gk_core::{
    Deployment, Error, Instance, Job, JobOutcome, LaunchParameters, RebootState, SecurityLevel,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub api_version: String,
    pub instance_limit: Option<usize>,
}

/// Stable error body: numeric code plus short human text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    pub message: String,
}

impl From<&Error> for ErrorMessage {
    fn from(err: &Error) -> Self {
        Self {
            error_code: err.code.map(|c| c.as_u32()),
            message: err.message.clone(),
        }
    }
}

/// Body for `/Instance` reads and the 201 create response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceResponse {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub online: bool,
    pub autostart: bool,
    pub auto_update: bool,
    /// Set on create/attach responses: whether the sentinel was consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached: Option<bool>,
}

impl InstanceResponse {
    pub fn from_instance(instance: &Instance, attached: Option<bool>) -> Self {
        Self {
            id: instance.id.to_string(),
            name: instance.name.clone(),
            path: instance.path.clone(),
            online: instance.online,
            autostart: instance.autostart,
            auto_update: instance.auto_update,
            attached,
        }
    }
}

/// Body for `/Job` reads and every 202 accepted response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub description: String,
    pub started_by: String,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at_ms: Option<u64>,
    pub progress: u8,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMessage>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        let (cancelled, error) = match &job.outcome {
            Some(JobOutcome::Cancelled) => (true, None),
            Some(JobOutcome::Errored { code, message }) => (
                false,
                Some(ErrorMessage {
                    error_code: code.map(|c| c.as_u32()),
                    message: message.clone(),
                }),
            ),
            _ => (false, None),
        };
        Self {
            id: job.id.to_string(),
            instance_id: job.instance.as_ref().map(|i| i.to_string()),
            description: job.description.clone(),
            started_by: job.started_by.clone(),
            started_at_ms: job.started_at_ms,
            stopped_at_ms: job.stopped_at_ms,
            progress: job.progress,
            cancelled,
            error,
        }
    }
}

/// Body for `/Instance/{id}/DreamDaemon` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogStatusResponse {
    pub status: String,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<SecurityLevel>,
    pub reboot_state: RebootState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_compile_job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_compile_job: Option<String>,
    pub launch: LaunchParameters,
}

/// Body for `/Instance/{id}/Repository` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub tracking_branch: bool,
}

/// Body for `/Instance/{id}/DreamMaker` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub id: String,
    pub sha: String,
    pub origin_sha: String,
    pub minimum_security: SecurityLevel,
    pub toolchain_version: String,
    pub artifact: String,
    pub test_merge_count: usize,
}

impl From<&Deployment> for DeploymentResponse {
    fn from(dep: &Deployment) -> Self {
        Self {
            id: dep.id.to_string(),
            sha: dep.revision.sha.clone(),
            origin_sha: dep.revision.origin_sha.clone(),
            minimum_security: dep.minimum_security,
            toolchain_version: dep.toolchain_version.clone(),
            artifact: dep.artifact.clone(),
            test_merge_count: dep.revision.active_test_merges.len(),
        }
    }
}

/// Body for `/Instance/{id}/Byond` reads: the toolchain cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainResponse {
    pub active_version: Option<String>,
    pub installed_versions: Vec<String>,
}

/// Body for `/Instance/{id}/ChatBot` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBotResponse {
    pub name: String,
    pub provider: String,
    pub enabled: bool,
    /// channel class → bound channel ids.
    pub channels: std::collections::HashMap<String, Vec<String>>,
}

/// Body for `/Instance/{id}/InstanceUser` reads: one user's rights
/// masks, raw bit values per subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceUserResponse {
    pub user: String,
    pub instance_rights: u64,
    pub repository_rights: u64,
    pub watchdog_rights: u64,
    pub deployment_rights: u64,
    pub chat_rights: u64,
    pub configuration_rights: u64,
    pub toolchain_rights: u64,
}

impl InstanceUserResponse {
    pub fn from_rights(user: &str, rights: &gk_core::InstanceUserRights) -> Self {
        Self {
            user: user.to_string(),
            instance_rights: rights.instance.0,
            repository_rights: rights.repository.0,
            watchdog_rights: rights.watchdog.0,
            deployment_rights: rights.deployment.0,
            chat_rights: rights.chat.0,
            configuration_rights: rights.configuration.0,
            toolchain_rights: rights.toolchain.0,
        }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
