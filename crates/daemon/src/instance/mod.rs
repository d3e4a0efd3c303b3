// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instances: the composite of repository, toolchain, deployments,
//! watchdog, and chat for one game-server deployment unit.
//!
//! [`InstanceService`] is the live wiring for one instance directory;
//! [`manager::InstanceManager`] owns the registry and the CRUD surface.

pub mod manager;
pub mod ops;

pub use manager::{InstanceManager, ManagerDeps, UpdateOutcome};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use gk_core::{Instance, InstanceId, JobId, TestMerge};
use gk_repo::RepositoryEngine;

use crate::chat::ChatBridge;
use crate::deployment::DeploymentStore;
use crate::event_bus::EventBus;
use crate::storage::Store;
use crate::toolchain::{ToolchainInstaller, ToolchainManager};
use crate::watchdog::{SessionDeps, Watchdog, WatchdogDeps};

/// Subdirectories every instance carries.
pub const REPOSITORY_DIR: &str = "Repository";
pub const TOOLCHAIN_DIR: &str = "Toolchain";
pub const GAME_DIR: &str = "Game";
pub const CONFIGURATION_DIR: &str = "Configuration";

pub fn instance_subdirs(path: &Path) -> [PathBuf; 4] {
    [
        path.join(REPOSITORY_DIR),
        path.join(TOOLCHAIN_DIR),
        path.join(GAME_DIR),
        path.join(CONFIGURATION_DIR),
    ]
}

/// Live wiring for one instance.
pub struct InstanceService {
    pub id: InstanceId,
    pub path: PathBuf,
    pub repository: RepositoryEngine,
    pub toolchain: ToolchainManager,
    pub deployments: DeploymentStore,
    pub watchdog: Watchdog,
    pub chat: Arc<ChatBridge>,
    /// Serialises mutators on this instance: move, online toggle, deploy.
    pub serial: tokio::sync::Mutex<()>,
    /// Test merges applied since the last reset, captured into the next
    /// deployment's revision information.
    pub test_merges: Mutex<Vec<TestMerge>>,
    move_job: Mutex<Option<JobId>>,
    /// Suppresses autostart on the first online after a relocation.
    just_relocated: AtomicBool,
    chat_task: CancellationToken,
}

impl InstanceService {
    pub fn build(record: &Instance, deps: &ServiceDeps) -> Arc<Self> {
        let id = record.id.clone();
        let path = record.path.clone();
        let repository = RepositoryEngine::new(
            path.join(REPOSITORY_DIR),
            id.clone(),
            deps.bus.sender(&id),
        );
        let toolchain =
            ToolchainManager::new(path.join(TOOLCHAIN_DIR), deps.installer.clone());
        let deployments = DeploymentStore::new(path.join(GAME_DIR));
        let watchdog = Watchdog::new(WatchdogDeps {
            instance: id.clone(),
            session: SessionDeps {
                instance: id.clone(),
                executor: deps.executor.clone(),
                registrar: deps.registrar.clone(),
                topic: deps.topic.clone(),
                bridge_port: deps.bridge_port,
            },
            deployments: deployments.clone(),
            toolchain: toolchain.clone(),
            store: deps.store.clone(),
            events: deps.bus.clone(),
        });

        let chat = Arc::new(ChatBridge::new(id.clone()));
        let chat_task = CancellationToken::new();
        {
            let chat = chat.clone();
            let events = deps.bus.subscribe(&id);
            let token = chat_task.clone();
            let settings = record.chat.clone();
            tokio::spawn(async move {
                chat.reload(&settings).await;
                chat.run(events, token).await;
            });
        }

        Arc::new(Self {
            id,
            path,
            repository,
            toolchain,
            deployments,
            watchdog,
            chat,
            serial: tokio::sync::Mutex::new(()),
            test_merges: Mutex::new(Vec::new()),
            move_job: Mutex::new(None),
            just_relocated: AtomicBool::new(false),
            chat_task,
        })
    }

    pub fn pending_move_job(&self) -> Option<JobId> {
        self.move_job.lock().clone()
    }

    pub(crate) fn set_move_job(&self, job: Option<JobId>) -> Option<JobId> {
        std::mem::replace(&mut *self.move_job.lock(), job)
    }

    pub fn mark_relocated(&self) {
        self.just_relocated.store(true, Ordering::SeqCst);
    }

    /// Consume the relocation marker; true exactly once per relocation.
    pub(crate) fn take_relocated(&self) -> bool {
        self.just_relocated.swap(false, Ordering::SeqCst)
    }

    /// Stop background tasks ahead of detach or rebuild.
    pub fn shutdown_tasks(&self) {
        self.chat_task.cancel();
    }
}

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub store: Arc<Store>,
    pub bus: EventBus,
    pub installer: Arc<dyn ToolchainInstaller>,
    pub executor: gk_adapters::ProcessExecutor,
    pub registrar: crate::watchdog::BridgeRegistrar,
    pub topic: Arc<dyn crate::watchdog::TopicClient>,
    pub bridge_port: u16,
}
