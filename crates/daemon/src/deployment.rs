// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment artifacts addressable by revision.
//!
//! A deployment lands in two parallel staging directories (`live-a`,
//! `live-b`) under `<instance>/Game/<deployment id>/` so the watchdog can
//! run one while staging the other. Exactly one deployment is `latest`;
//! deletion is refcounted — a [`DmbProvider`] held by a session keeps its
//! directories on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use gk_core::{Deployment, DeploymentId, Error, ErrorCode};

pub const PRIMARY_DIR: &str = "live-a";
pub const SECONDARY_DIR: &str = "live-b";

struct Entry {
    deployment: Deployment,
    refs: usize,
    pending_delete: bool,
}

struct StoreInner {
    root: PathBuf,
    entries: Mutex<HashMap<DeploymentId, Entry>>,
    latest: Mutex<Option<DeploymentId>>,
}

/// Per-instance deployment registry.
#[derive(Clone)]
pub struct DeploymentStore {
    inner: Arc<StoreInner>,
}

/// Paths a fresh deployment is staged into before being committed.
#[derive(Debug, Clone)]
pub struct StagingDirs {
    pub primary: PathBuf,
    pub secondary: PathBuf,
}

impl DeploymentStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root,
                entries: Mutex::new(HashMap::new()),
                latest: Mutex::new(None),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn dirs_for(&self, id: &DeploymentId) -> StagingDirs {
        let base = self.inner.root.join(id.as_str());
        StagingDirs {
            primary: base.join(PRIMARY_DIR),
            secondary: base.join(SECONDARY_DIR),
        }
    }

    /// Create the paired staging directories for a deployment in progress.
    pub async fn stage(&self, id: &DeploymentId) -> Result<StagingDirs, Error> {
        let dirs = self.dirs_for(id);
        for dir in [&dirs.primary, &dirs.secondary] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::internal(format!("staging {}: {}", dir.display(), e)))?;
        }
        Ok(dirs)
    }

    /// Register a finished deployment and point `latest` at it.
    pub fn commit(&self, deployment: Deployment) {
        let id = deployment.id.clone();
        self.inner.entries.lock().insert(
            id.clone(),
            Entry { deployment, refs: 0, pending_delete: false },
        );
        *self.inner.latest.lock() = Some(id.clone());
        info!(deployment = %id, "deployment committed as latest");
    }

    pub fn latest(&self) -> Option<Deployment> {
        let latest = self.inner.latest.lock().clone()?;
        self.get(&latest)
    }

    pub fn get(&self, id: &DeploymentId) -> Option<Deployment> {
        self.inner.entries.lock().get(id).map(|e| e.deployment.clone())
    }

    pub fn list(&self) -> Vec<Deployment> {
        let mut all: Vec<Deployment> = self
            .inner
            .entries
            .lock()
            .values()
            .map(|e| e.deployment.clone())
            .collect();
        all.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        all
    }

    /// Take a refcounted hold on a deployment for a session.
    pub fn acquire(&self, id: &DeploymentId) -> Result<DmbProvider, Error> {
        let mut entries = self.inner.entries.lock();
        let entry = entries.get_mut(id).ok_or_else(|| {
            Error::conflict(ErrorCode::DeploymentMissing, format!("no deployment {}", id))
        })?;
        if entry.pending_delete {
            return Err(Error::conflict(
                ErrorCode::DeploymentMissing,
                format!("deployment {} is being deleted", id),
            ));
        }
        entry.refs += 1;
        let deployment = entry.deployment.clone();
        drop(entries);
        let dirs = self.dirs_for(id);
        Ok(DmbProvider {
            deployment,
            dirs,
            store: self.inner.clone(),
        })
    }

    /// Delete a deployment's directories. Deferred while any session
    /// holds it.
    pub fn delete(&self, id: &DeploymentId) {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        if entry.refs > 0 {
            entry.pending_delete = true;
            info!(deployment = %id, "delete deferred until sessions release it");
            return;
        }
        entries.remove(id);
        drop(entries);
        {
            let mut latest = self.inner.latest.lock();
            if latest.as_ref() == Some(id) {
                *latest = None;
            }
        }
        remove_deployment_dirs(&self.inner.root, id);
    }

    /// Restore entries for deployments found on disk at startup.
    pub fn adopt(&self, deployments: Vec<Deployment>) {
        let mut newest: Option<(u64, DeploymentId)> = None;
        let mut entries = self.inner.entries.lock();
        for deployment in deployments {
            match &newest {
                Some((at, _)) if *at >= deployment.created_at_ms => {}
                _ => newest = Some((deployment.created_at_ms, deployment.id.clone())),
            }
            entries.insert(
                deployment.id.clone(),
                Entry { deployment, refs: 0, pending_delete: false },
            );
        }
        drop(entries);
        if let Some((_, id)) = newest {
            *self.inner.latest.lock() = Some(id);
        }
    }
}

fn remove_deployment_dirs(root: &Path, id: &DeploymentId) {
    let base = root.join(id.as_str());
    if let Err(e) = std::fs::remove_dir_all(&base) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(deployment = %id, error = %e, "failed to remove deployment directories");
        }
    }
}

/// A session's hold on one deployment: the artifact name plus both
/// staging directories. Dropping the provider releases the hold and
/// completes any deferred delete.
pub struct DmbProvider {
    deployment: Deployment,
    dirs: StagingDirs,
    store: Arc<StoreInner>,
}

impl std::fmt::Debug for DmbProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmbProvider")
            .field("deployment", &self.deployment)
            .field("dirs", &self.dirs)
            .finish()
    }
}

impl DmbProvider {
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn artifact(&self) -> &str {
        &self.deployment.artifact
    }

    /// Directory a session launches from.
    pub fn launch_dir(&self, primary: bool) -> &Path {
        if primary {
            &self.dirs.primary
        } else {
            &self.dirs.secondary
        }
    }
}

impl Drop for DmbProvider {
    fn drop(&mut self) {
        let id = self.deployment.id.clone();
        let mut entries = self.store.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        let delete_now = entry.pending_delete && entry.refs == 0;
        if delete_now {
            entries.remove(&id);
            drop(entries);
            {
                let mut latest = self.store.latest.lock();
                if latest.as_ref() == Some(&id) {
                    *latest = None;
                }
            }
            remove_deployment_dirs(&self.store.root, &id);
        }
    }
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod tests;
