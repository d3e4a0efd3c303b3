// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events published on the per-instance bus.
//!
//! The watchdog, repository engine, and deployment pipeline publish;
//! the chat bridge and tests subscribe. Cross-component references go
//! through this bus instead of direct setter wiring, keeping ownership
//! a DAG rooted at the instance.

use crate::deployment::DeploymentId;
use crate::instance::InstanceId;
use serde::{Deserialize, Serialize};

/// Classification of chat channels an event is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Watchdog,
    Dev,
    Admin,
    Game,
}

crate::simple_display! {
    ChannelKind {
        Watchdog => "watchdog",
        Dev => "dev",
        Admin => "admin",
        Game => "game",
    }
}

/// Something observable happened inside an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RepoFetch {
        instance: InstanceId,
    },
    /// A test merge landed. `fast_forward` distinguishes a trivial merge
    /// from a real merge commit.
    RepoMergePullRequest {
        instance: InstanceId,
        number: u64,
        sha: String,
        fast_forward: bool,
    },
    /// A test merge conflicted and was rolled back.
    RepoMergeConflict {
        instance: InstanceId,
        head_sha: String,
        target: String,
        head_reference: String,
        branch: String,
    },
    DeployStarted {
        instance: InstanceId,
    },
    DeployComplete {
        instance: InstanceId,
        deployment: DeploymentId,
    },
    DeployFailed {
        instance: InstanceId,
        error: String,
    },
    WatchdogLaunched {
        instance: InstanceId,
        port: u16,
    },
    /// A session died without a pending graceful reboot.
    WatchdogCrashed {
        instance: InstanceId,
        relaunching: bool,
    },
    WatchdogShutdown {
        instance: InstanceId,
    },
    InstanceOnline {
        instance: InstanceId,
    },
    InstanceOffline {
        instance: InstanceId,
    },
}

impl Event {
    pub fn instance(&self) -> &InstanceId {
        match self {
            Event::RepoFetch { instance }
            | Event::RepoMergePullRequest { instance, .. }
            | Event::RepoMergeConflict { instance, .. }
            | Event::DeployStarted { instance }
            | Event::DeployComplete { instance, .. }
            | Event::DeployFailed { instance, .. }
            | Event::WatchdogLaunched { instance, .. }
            | Event::WatchdogCrashed { instance, .. }
            | Event::WatchdogShutdown { instance }
            | Event::InstanceOnline { instance }
            | Event::InstanceOffline { instance } => instance,
        }
    }

    /// The channel class this event is delivered to.
    pub fn channel(&self) -> ChannelKind {
        match self {
            Event::RepoFetch { .. }
            | Event::RepoMergePullRequest { .. }
            | Event::RepoMergeConflict { .. }
            | Event::DeployStarted { .. }
            | Event::DeployComplete { .. }
            | Event::DeployFailed { .. } => ChannelKind::Dev,
            Event::WatchdogLaunched { .. }
            | Event::WatchdogCrashed { .. }
            | Event::WatchdogShutdown { .. } => ChannelKind::Watchdog,
            Event::InstanceOnline { .. } | Event::InstanceOffline { .. } => ChannelKind::Admin,
        }
    }

    /// Human text delivered to chat channels.
    pub fn message(&self) -> String {
        match self {
            Event::RepoFetch { .. } => "Repository: fetched origin".to_string(),
            Event::RepoMergePullRequest { number, sha, fast_forward, .. } => format!(
                "Repository: merged PR #{} at {} ({})",
                number,
                &sha[..sha.len().min(8)],
                if *fast_forward { "fast-forward" } else { "merge commit" },
            ),
            Event::RepoMergeConflict { target, .. } => {
                format!("Repository: test merge of {} conflicted, rolled back", target)
            }
            Event::DeployStarted { .. } => "Deployment: compile started".to_string(),
            Event::DeployComplete { deployment, .. } => {
                format!("Deployment: {} ready", deployment)
            }
            Event::DeployFailed { error, .. } => format!("Deployment failed: {}", error),
            Event::WatchdogLaunched { port, .. } => {
                format!("Watchdog: server launched on port {}", port)
            }
            Event::WatchdogCrashed { relaunching, .. } => {
                if *relaunching {
                    "Watchdog: server exited unexpectedly, relaunching".to_string()
                } else {
                    "Watchdog: server exited unexpectedly".to_string()
                }
            }
            Event::WatchdogShutdown { .. } => "Watchdog: server shut down".to_string(),
            Event::InstanceOnline { .. } => "Instance set online".to_string(),
            Event::InstanceOffline { .. } => "Instance set offline".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
