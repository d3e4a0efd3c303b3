// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State reconciliation after daemon restart.
//!
//! For each instance: re-adopt deployments from their on-disk metadata,
//! clean the toolchain cache, then restore sessions — a live reattach
//! record rebinds the running process, a dead one is cleared, and online
//! autostart instances without a session are relaunched.

use std::sync::Arc;

use tracing::{info, warn};

use gk_core::{Clock, Deployment};

use crate::config::Config;
use crate::instance::{InstanceManager, InstanceService};

pub async fn reconcile_instances<C: Clock>(manager: &Arc<InstanceManager<C>>, config: &Config) {
    for record in manager.list() {
        let Ok(service) = manager.service(&record.id).await else {
            continue;
        };

        adopt_deployments(&service).await;
        service
            .toolchain
            .clean_cache(&config.general.pinned_toolchain_versions)
            .await;

        if !record.online {
            continue;
        }

        match service.watchdog.reattach(record.launch.clone()).await {
            Ok(true) => {
                info!(instance = %record.id, "session reattached");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(instance = %record.id, error = %e, "reattach failed");
                continue;
            }
        }

        if record.autostart {
            let token = tokio_util::sync::CancellationToken::new();
            match service.watchdog.start(record.launch.clone(), false, &token).await {
                Ok(()) => info!(instance = %record.id, "watchdog autostarted"),
                Err(e) => {
                    warn!(instance = %record.id, error = %e, "autostart failed")
                }
            }
        }
    }
}

/// Rebuild the deployment registry from `deployment.json` metadata files
/// left beside each staging pair.
async fn adopt_deployments(service: &Arc<InstanceService>) {
    let root = service.deployments.root().to_path_buf();
    let Ok(mut entries) = tokio::fs::read_dir(&root).await else {
        return;
    };
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let metadata = entry.path().join("deployment.json");
        let Ok(contents) = tokio::fs::read_to_string(&metadata).await else {
            continue;
        };
        match serde_json::from_str::<Deployment>(&contents) {
            Ok(deployment) => found.push(deployment),
            Err(e) => {
                warn!(path = %metadata.display(), error = %e, "unreadable deployment metadata")
            }
        }
    }
    if !found.is_empty() {
        info!(instance = %service.id, count = found.len(), "deployments adopted");
        service.deployments.adopt(found);
    }
}
