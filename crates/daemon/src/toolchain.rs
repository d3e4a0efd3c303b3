// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compiler toolchain cache: install, lock, evict.
//!
//! Versions live under `<instance>/Toolchain/<version>/`. Install and
//! uninstall take the exclusive lock; sessions take shared locks for the
//! lifetime of their process. A shared lock blocks eviction of its
//! version. The actual installer (download + extract) is an external
//! collaborator behind [`ToolchainInstaller`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gk_core::{Error, ErrorCode};

/// Server binary within an installed version directory.
pub fn server_binary(version_dir: &Path) -> PathBuf {
    version_dir.join("bin").join("gamed")
}

/// Command-line needle identifying the toolchain's interactive client.
pub const PAGER_NEEDLE: &str = "gamepager";

/// Installs a version into a destination directory.
#[async_trait]
pub trait ToolchainInstaller: Send + Sync {
    async fn install(
        &self,
        version: &str,
        dest: &Path,
        token: &CancellationToken,
    ) -> Result<(), Error>;
}

/// Installer for deployments where versions are provisioned out of band:
/// it accepts any version already present and refuses to fetch new ones.
#[derive(Debug, Default)]
pub struct CacheOnlyInstaller;

#[async_trait]
impl ToolchainInstaller for CacheOnlyInstaller {
    async fn install(
        &self,
        version: &str,
        dest: &Path,
        _token: &CancellationToken,
    ) -> Result<(), Error> {
        if dest.is_dir() {
            return Ok(());
        }
        Err(Error::not_supported(format!(
            "toolchain {} is not provisioned and this build has no installer",
            version
        )))
    }
}

#[derive(Debug, Default)]
struct VersionLocks {
    exclusive: bool,
    shared: usize,
}

struct ManagerInner {
    root: PathBuf,
    locks: Mutex<HashMap<String, VersionLocks>>,
}

/// Held by a session for the lifetime of its process.
pub struct SharedLock {
    version: String,
    inner: Arc<ManagerInner>,
}

impl SharedLock {
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Installed directory of the locked version.
    pub fn version_dir(&self) -> PathBuf {
        self.inner.root.join(&self.version)
    }
}

impl Drop for SharedLock {
    fn drop(&mut self) {
        let mut locks = self.inner.locks.lock();
        if let Some(entry) = locks.get_mut(&self.version) {
            entry.shared = entry.shared.saturating_sub(1);
        }
    }
}

struct ExclusiveLock {
    version: String,
    inner: Arc<ManagerInner>,
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        let mut locks = self.inner.locks.lock();
        if let Some(entry) = locks.get_mut(&self.version) {
            entry.exclusive = false;
        }
    }
}

/// Per-instance toolchain cache.
#[derive(Clone)]
pub struct ToolchainManager {
    inner: Arc<ManagerInner>,
    installer: Arc<dyn ToolchainInstaller>,
}

impl ToolchainManager {
    pub fn new(root: PathBuf, installer: Arc<dyn ToolchainInstaller>) -> Self {
        Self {
            inner: Arc::new(ManagerInner { root, locks: Mutex::new(HashMap::new()) }),
            installer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn lock_exclusive(&self, version: &str) -> Result<ExclusiveLock, Error> {
        let mut locks = self.inner.locks.lock();
        let entry = locks.entry(version.to_string()).or_default();
        if entry.exclusive || entry.shared > 0 {
            return Err(Error::conflict(
                ErrorCode::ToolchainVersionInUse,
                format!("toolchain {} is in use", version),
            ));
        }
        entry.exclusive = true;
        Ok(ExclusiveLock { version: version.to_string(), inner: self.inner.clone() })
    }

    /// Install a version into the cache (no-op when already present).
    pub async fn install(&self, version: &str, token: &CancellationToken) -> Result<(), Error> {
        let _exclusive = self.lock_exclusive(version)?;
        let dest = self.inner.root.join(version);
        if dest.is_dir() {
            return Ok(());
        }
        self.installer.install(version, &dest, token).await?;
        info!(version, "toolchain installed");
        Ok(())
    }

    /// Remove a version from the cache.
    pub async fn uninstall(&self, version: &str) -> Result<(), Error> {
        let _exclusive = self.lock_exclusive(version)?;
        let dest = self.inner.root.join(version);
        match tokio::fs::remove_dir_all(&dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::internal(format!(
                "failed to remove toolchain {}: {}",
                version, e
            ))),
        }
    }

    /// Take a shared lock for session use. The version must be installed
    /// and not exclusively locked.
    pub fn acquire_shared(&self, version: &str) -> Result<SharedLock, Error> {
        if !self.inner.root.join(version).is_dir() {
            return Err(Error::conflict(
                ErrorCode::ToolchainVersionInUse,
                format!("toolchain {} is not installed", version),
            ));
        }
        let mut locks = self.inner.locks.lock();
        let entry = locks.entry(version.to_string()).or_default();
        if entry.exclusive {
            return Err(Error::conflict(
                ErrorCode::ToolchainVersionInUse,
                format!("toolchain {} is being modified", version),
            ));
        }
        entry.shared += 1;
        Ok(SharedLock { version: version.to_string(), inner: self.inner.clone() })
    }

    /// Versions currently present in the cache directory.
    pub fn installed_versions(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.inner.root) else {
            return Vec::new();
        };
        let mut versions: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        versions.sort();
        versions
    }

    /// Evict unreferenced, unpinned versions. Runs on daemon start.
    pub async fn clean_cache(&self, pins: &[String]) -> usize {
        let mut evicted = 0;
        for version in self.installed_versions() {
            if pins.iter().any(|p| p == &version) {
                continue;
            }
            {
                let locks = self.inner.locks.lock();
                if let Some(entry) = locks.get(&version) {
                    if entry.shared > 0 || entry.exclusive {
                        continue;
                    }
                }
            }
            match self.uninstall(&version).await {
                Ok(()) => {
                    info!(%version, "evicted unreferenced toolchain");
                    evicted += 1;
                }
                Err(e) => warn!(%version, error = %e, "toolchain eviction skipped"),
            }
        }
        evicted
    }
}

#[cfg(test)]
#[path = "toolchain_tests.rs"]
mod tests;
