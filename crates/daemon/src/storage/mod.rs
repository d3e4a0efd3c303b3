// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted daemon state.
//!
//! This is the storage *contract*: one [`PersistedState`] document holding
//! instances, jobs, and reattach records, written atomically to a JSON
//! file in the state directory. A production deployment can replace this
//! with the external database layer; the embedded file store is the
//! default and what every test runs against.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use gk_core::{Instance, InstanceId, Job, JobId, ReattachRecord};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write state file: {0}")]
    Write(#[from] gk_adapters::IoError),
    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything the daemon persists across restarts.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// instance id → record.
    pub instances: HashMap<String, Instance>,
    /// job id → record.
    pub jobs: HashMap<String, Job>,
    /// instance id → reattach record.
    pub reattach: HashMap<String, ReattachRecord>,
}

impl PersistedState {
    pub fn instance(&self, id: &InstanceId) -> Option<&Instance> {
        self.instances.get(id.as_str())
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id.as_str())
    }

    pub fn instance_by_name(&self, name: &str) -> Option<&Instance> {
        self.instances.values().find(|i| i.name == name)
    }
}

/// File-backed store; all reads and writes go through the in-memory copy.
pub struct Store {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl Store {
    /// Load the state file, or start empty when none exists.
    pub fn load(path: PathBuf) -> Result<Arc<Self>, StorageError> {
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                StorageError::Corrupt { path: path.clone(), source }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(source) => return Err(StorageError::Read { path, source }),
        };
        Ok(Arc::new(Self { path, state: Mutex::new(state) }))
    }

    /// In-memory store for tests; `save` still writes to the given path.
    pub fn in_memory(path: PathBuf) -> Arc<Self> {
        Arc::new(Self { path, state: Mutex::new(PersistedState::default()) })
    }

    /// Read access under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Mutate then persist atomically.
    pub async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> R,
    ) -> Result<R, StorageError> {
        let (result, serialized) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, serde_json::to_vec_pretty(&*state)?)
        };
        gk_adapters::io::atomic_write(&self.path, &serialized).await?;
        Ok(result)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
