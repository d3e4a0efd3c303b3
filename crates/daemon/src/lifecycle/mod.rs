// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, state recovery, shutdown.

mod reconcile;

pub use reconcile::reconcile_instances;

use std::sync::Arc;

use tracing::info;

use gk_core::SystemClock;

use crate::config::{Config, ConfigError};
use crate::event_bus::EventBus;
use crate::instance::{InstanceManager, ManagerDeps, ServiceDeps};
use crate::jobs::JobManager;
use crate::storage::{StorageError, Store};
use crate::toolchain::CacheOnlyInstaller;
use crate::watchdog::{BridgeRegistrar, TcpTopicClient};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to prepare state directory: {0}")]
    StateDir(#[source] std::io::Error),
    #[error("startup failed: {0}")]
    Startup(String),
}

/// The wired daemon.
pub struct Daemon {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub jobs: Arc<JobManager<SystemClock>>,
    pub instances: Arc<InstanceManager<SystemClock>>,
    pub bus: EventBus,
    pub registrar: BridgeRegistrar,
}

impl Daemon {
    /// Stop background tasks and release supervision. Sessions keep
    /// running — their reattach records are already persisted, and the
    /// next daemon rebinds them.
    pub async fn shutdown(&self) {
        for record in self.instances.list() {
            if let Ok(service) = self.instances.service(&record.id).await {
                service.watchdog.release().await;
                service.shutdown_tasks();
            }
        }
        info!("daemon shut down; sessions left running for reattach");
    }
}

/// Build and recover the daemon: load state, sweep interrupted jobs,
/// rebuild instance services, clean toolchain caches, and reattach or
/// relaunch sessions.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    let config = Arc::new(config);
    tokio::fs::create_dir_all(&config.general.state_dir)
        .await
        .map_err(LifecycleError::StateDir)?;

    let store = Store::load(config.state_file())?;
    let clock = SystemClock;
    let jobs = JobManager::new(store.clone(), clock.clone());
    let swept = jobs
        .sweep_interrupted()
        .await
        .map_err(|e| LifecycleError::Startup(e.to_string()))?;
    if swept > 0 {
        info!(swept, "marked interrupted jobs cancelled");
    }

    let bus = EventBus::new();
    let registrar = BridgeRegistrar::new();
    let services = ServiceDeps {
        store: store.clone(),
        bus: bus.clone(),
        installer: Arc::new(CacheOnlyInstaller),
        executor: gk_adapters::ProcessExecutor,
        registrar: registrar.clone(),
        topic: Arc::new(TcpTopicClient),
        bridge_port: config.general.bridge_port,
    };
    let instances = InstanceManager::new(ManagerDeps {
        config: config.clone(),
        store: store.clone(),
        jobs: jobs.clone(),
        bus: bus.clone(),
        services,
        clock,
    });
    instances.adopt_persisted().await;

    reconcile_instances(&instances, &config).await;

    info!(
        instances = instances.list().len(),
        state = %config.state_file().display(),
        "daemon ready"
    );
    Ok(Daemon { config, store, jobs, instances, bus, registrar })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
