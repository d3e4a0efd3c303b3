// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The instance manager: create/attach, detach, update, list.
//!
//! Path invariants enforced here, in order: the proposed path is never
//! inside the daemon install directory (nor contains it), never inside
//! another instance (nor contains one), must satisfy the configured
//! whitelist, and must be empty, non-existent, or carry the attach
//! sentinel. The sentinel also stores the detached instance's id so a
//! re-attach restores the same identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gk_adapters::io;
use gk_core::rights::{instance as instance_bits, Rights};
use gk_core::{
    CancelRight, Clock, Error, ErrorCode, ErrorKind, Event, Instance, InstanceId, InstanceUpdate,
    InstanceUserRights, Job, JobId, RightsType, ATTACH_SENTINEL,
};

use crate::config::Config;
use crate::event_bus::EventBus;
use crate::instance::{instance_subdirs, InstanceService, ServiceDeps};
use crate::jobs::{JobContext, JobManager};
use crate::storage::Store;

/// Result of an update: the (possibly unchanged) record, plus the move
/// job when a relocation was scheduled.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub instance: Instance,
    pub move_job: Option<Job>,
}

/// Everything the manager needs besides its own registry.
pub struct ManagerDeps<C: Clock> {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub jobs: Arc<JobManager<C>>,
    pub bus: EventBus,
    pub services: ServiceDeps,
    pub clock: C,
}

pub struct InstanceManager<C: Clock> {
    deps: ManagerDeps<C>,
    services: tokio::sync::Mutex<HashMap<InstanceId, Arc<InstanceService>>>,
}

impl<C: Clock> InstanceManager<C> {
    pub fn new(deps: ManagerDeps<C>) -> Arc<Self> {
        Arc::new(Self { deps, services: tokio::sync::Mutex::new(HashMap::new()) })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.deps.store
    }

    pub fn jobs(&self) -> &Arc<JobManager<C>> {
        &self.deps.jobs
    }

    pub(crate) fn clock(&self) -> &C {
        &self.deps.clock
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.deps.bus
    }

    /// Create a new instance, or re-attach a detached one when the
    /// target directory carries the sentinel.
    pub async fn create_or_attach(
        &self,
        user: &str,
        name: &str,
        path: &Path,
    ) -> Result<(Instance, bool), Error> {
        if name.trim().is_empty() {
            return Err(invalid("instance name must not be empty"));
        }
        if path.as_os_str().is_empty() {
            return Err(invalid("instance path must not be empty"));
        }
        let path = io::normalize(path).map_err(|e| invalid(e.to_string()))?;
        self.check_path_invariants(&path)?;

        if self.deps.store.with(|s| s.instance_by_name(name).is_some()) {
            return Err(Error::conflict(
                ErrorCode::InstanceNameTaken,
                format!("instance name {:?} already in use", name),
            ));
        }

        // Decide create vs attach from the directory's state.
        let sentinel = path.join(ATTACH_SENTINEL);
        let attached_id: Option<InstanceId> = match tokio::fs::read_to_string(&sentinel).await {
            Ok(contents) => {
                let id = contents.trim();
                (!id.is_empty()).then(|| InstanceId::from_string(id))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !io::dir_is_empty(&path).await.map_err(internal)? {
                    return Err(Error::conflict(
                        ErrorCode::InstanceAtExistingPath,
                        format!("{} exists and is not attachable", path.display()),
                    ));
                }
                None
            }
            Err(e) => return Err(internal(e)),
        };
        let attached = attached_id.is_some();

        let mut record = Instance::new(name, path.clone());
        if let Some(id) = attached_id {
            record.id = id;
        }
        record.rights.insert(user.to_string(), InstanceUserRights::full());

        for dir in instance_subdirs(&path) {
            tokio::fs::create_dir_all(&dir).await.map_err(internal)?;
        }
        match tokio::fs::remove_file(&sentinel).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(internal(e)),
        }

        let stored = record.clone();
        self.deps
            .store
            .mutate(|s| {
                s.instances.insert(stored.id.to_string(), stored.clone());
            })
            .await
            .map_err(internal)?;

        let service = InstanceService::build(&record, &self.deps.services);
        self.services.lock().await.insert(record.id.clone(), service);
        info!(instance = %record.id, path = %path.display(), attached, "instance registered");
        Ok((record, attached))
    }

    /// Soft-remove: write the sentinel (carrying the id), cascade the
    /// reattach record, drop the DB record. The directory tree stays.
    pub async fn detach(&self, id: &InstanceId) -> Result<(), Error> {
        let record = self.get(id)?;
        if record.online {
            return Err(Error::conflict(
                ErrorCode::InstanceDetachOnline,
                "instance must be offline to detach",
            ));
        }

        io::atomic_write(
            &record.path.join(ATTACH_SENTINEL),
            record.id.to_string().as_bytes(),
        )
        .await
        .map_err(internal)?;

        self.deps
            .store
            .mutate(|s| {
                s.instances.remove(id.as_str());
                s.reattach.remove(id.as_str());
            })
            .await
            .map_err(internal)?;

        if let Some(service) = self.services.lock().await.remove(id) {
            service.shutdown_tasks();
        }
        self.deps.bus.remove(id);
        info!(instance = %id, "instance detached");
        Ok(())
    }

    /// Apply an explicit change-record. Per-field rights are checked;
    /// relocation is scheduled as a move job; the online toggle is a
    /// synchronous handoff with rollback on failure.
    pub async fn update(
        self: &Arc<Self>,
        user: &str,
        id: &InstanceId,
        update: InstanceUpdate,
    ) -> Result<UpdateOutcome, Error> {
        let service = self.service(id).await?;
        let _serial = service.serial.lock().await;

        let original = self.get(id)?;
        if update.is_empty() {
            return Ok(UpdateOutcome { instance: original, move_job: None });
        }
        check_update_rights(&original.rights_for(user), &update)?;

        if let Some(launch) = &update.launch {
            launch.validate()?;
        }
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(invalid("instance name must not be empty"));
            }
            if *name != original.name
                && self.deps.store.with(|s| s.instance_by_name(name).is_some())
            {
                return Err(Error::conflict(
                    ErrorCode::InstanceNameTaken,
                    format!("instance name {:?} already in use", name),
                ));
            }
        }

        // Relocation is validated up front but applied by the move job.
        let move_target = match &update.path {
            Some(path) => {
                if original.online || update.online == Some(true) {
                    return Err(Error::conflict(
                        ErrorCode::InstanceRelocateOnline,
                        "instance must be offline to relocate",
                    ));
                }
                let target = io::normalize(path).map_err(|e| invalid(e.to_string()))?;
                self.check_path_invariants(&target)?;
                if !io::dir_is_empty(&target).await.map_err(internal)? {
                    return Err(Error::conflict(
                        ErrorCode::InstanceAtExistingPath,
                        format!("{} exists and is not empty", target.display()),
                    ));
                }
                Some(target)
            }
            None => None,
        };

        // Simple fields first; the watchdog handoff sees the new values.
        let mut updated = original.clone();
        apply_simple_fields(&mut updated, &update);
        if update.chat.is_some() {
            service.chat.reload(&updated.chat).await;
        }

        let persist = |record: Instance| async move {
            let stored = record.clone();
            self.deps
                .store
                .mutate(move |s| {
                    s.instances.insert(stored.id.to_string(), stored);
                })
                .await
                .map_err(internal)?;
            Ok::<Instance, Error>(record)
        };

        // Online toggle: synchronous lifecycle handoff.
        match update.online {
            Some(true) if !original.online => {
                updated.online = true;
                persist(updated.clone()).await?;
                let relocated = service.take_relocated();
                if updated.autostart && !relocated {
                    let token = CancellationToken::new();
                    if let Err(e) = service.watchdog.start(updated.launch.clone(), false, &token).await
                    {
                        // Roll every field back; the toggle never happened.
                        warn!(instance = %id, error = %e, "online handoff failed; rolling back");
                        persist(original.clone()).await?;
                        return Err(e);
                    }
                }
                self.deps.bus.publish(Event::InstanceOnline { instance: id.clone() });
            }
            Some(false) if original.online => {
                // Invariant: offline instances have no session.
                service.watchdog.stop(true).await.ok();
                updated.online = false;
                persist(updated.clone()).await?;
                self.deps.bus.publish(Event::InstanceOffline { instance: id.clone() });
            }
            _ => {
                updated.online = original.online;
                persist(updated.clone()).await?;
            }
        }

        let move_job = match move_target {
            Some(target) => Some(self.schedule_move(user, &service, target).await?),
            None => None,
        };

        Ok(UpdateOutcome { instance: self.get(id)?, move_job })
    }

    /// At most one move job per instance: a pending one is cancelled
    /// before the replacement is registered.
    async fn schedule_move(
        self: &Arc<Self>,
        user: &str,
        service: &Arc<InstanceService>,
        target: PathBuf,
    ) -> Result<Job, Error> {
        if let Some(previous) = service.pending_move_job() {
            self.deps.jobs.cancel_unchecked(&previous).await;
        }

        let job = Job::new(
            Some(service.id.clone()),
            format!("Relocate instance to {}", target.display()),
            user,
            Some(CancelRight {
                rights_type: RightsType::Instance,
                right: instance_bits::RELOCATE,
            }),
            &self.deps.clock,
        );
        let manager = Arc::clone(self);
        let instance_id = service.id.clone();
        let source = service.path.clone();
        let job_id = job.id.clone();

        let registered = self
            .deps
            .jobs
            .register(job, move |ctx: JobContext| async move {
                manager.run_move_job(ctx, instance_id, source, target).await
            })
            .await?;
        service.set_move_job(Some(job_id));
        Ok(registered)
    }

    async fn run_move_job(
        self: Arc<Self>,
        ctx: JobContext,
        id: InstanceId,
        source: PathBuf,
        target: PathBuf,
    ) -> Result<(), Error> {
        let service = self.service(&id).await?;
        let _serial = service.serial.lock().await;
        ctx.progress.report(5);
        if ctx.token.is_cancelled() {
            return Err(Error::new(ErrorKind::Transient, "move cancelled"));
        }

        io::copy_dir(&source, &target, &[]).await.map_err(internal)?;
        ctx.progress.report(70);
        if ctx.token.is_cancelled() {
            // Roll back: the copy is discarded, the record never moved.
            let _ = tokio::fs::remove_dir_all(&target).await;
            return Err(Error::new(ErrorKind::Transient, "move cancelled"));
        }

        let stored_target = target.clone();
        let stored_id = id.clone();
        self.deps
            .store
            .mutate(move |s| {
                if let Some(record) = s.instances.get_mut(stored_id.as_str()) {
                    record.path = stored_target;
                }
            })
            .await
            .map_err(internal)?;
        ctx.progress.report(85);

        tokio::fs::remove_dir_all(&source).await.map_err(internal)?;
        ctx.progress.report(95);

        // Rebuild the service against the new directory tree.
        service.shutdown_tasks();
        let record = self.get(&id)?;
        let rebuilt = InstanceService::build(&record, &self.deps.services);
        rebuilt.mark_relocated();
        rebuilt.set_move_job(None);
        self.services.lock().await.insert(id.clone(), rebuilt);
        info!(instance = %id, target = %record.path.display(), "instance relocated");
        Ok(())
    }

    pub fn get(&self, id: &InstanceId) -> Result<Instance, Error> {
        self.deps
            .store
            .with(|s| s.instance(id).cloned())
            .ok_or_else(|| Error::gone(format!("no instance {}", id)))
    }

    pub fn list(&self) -> Vec<Instance> {
        let mut all = self
            .deps
            .store
            .with(|s| s.instances.values().cloned().collect::<Vec<_>>());
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub async fn service(&self, id: &InstanceId) -> Result<Arc<InstanceService>, Error> {
        self.services
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::gone(format!("no instance {}", id)))
    }

    /// Rebuild services from persisted records at daemon startup.
    pub async fn adopt_persisted(&self) {
        let records = self.list();
        let mut services = self.services.lock().await;
        for record in records {
            let service = InstanceService::build(&record, &self.deps.services);
            services.insert(record.id.clone(), service);
        }
    }

    /// Path collision invariants plus the whitelist. The scan includes
    /// the caller's own record, which also rejects relocations into the
    /// instance's current tree.
    fn check_path_invariants(&self, path: &Path) -> Result<(), Error> {
        let install_dir = io::normalize(&self.deps.config.general.install_dir)
            .unwrap_or_else(|_| self.deps.config.general.install_dir.clone());
        if io::is_within(&install_dir, path) || io::is_within(path, &install_dir) {
            return Err(Error::conflict(
                ErrorCode::InstanceAtConflictingPath,
                format!("{} collides with the daemon installation", path.display()),
            ));
        }

        let collision = self.deps.store.with(|s| {
            s.instances
                .values()
                .find(|other| {
                    io::is_within(&other.path, path) || io::is_within(path, &other.path)
                })
                .map(|other| other.name.clone())
        });
        if let Some(other) = collision {
            return Err(Error::conflict(
                ErrorCode::InstanceAtConflictingPath,
                format!("{} collides with instance {:?}", path.display(), other),
            ));
        }

        let whitelist = &self.deps.config.general.valid_instance_paths;
        if !whitelist.is_empty()
            && !whitelist.iter().any(|allowed| {
                io::normalize(allowed)
                    .map(|allowed| io::is_within(&allowed, path))
                    .unwrap_or(false)
            })
        {
            return Err(Error::conflict(
                ErrorCode::InstanceNotAtWhitelistedPath,
                format!("{} is not under a whitelisted path", path.display()),
            ));
        }
        Ok(())
    }
}

fn check_update_rights(held: &InstanceUserRights, update: &InstanceUpdate) -> Result<(), Error> {
    let mut required = Rights::NONE;
    if update.name.is_some() {
        required = required | instance_bits::RENAME;
    }
    if update.path.is_some() {
        required = required | instance_bits::RELOCATE;
    }
    if update.online.is_some() {
        required = required | instance_bits::SET_ONLINE;
    }
    if update.autostart.is_some() || update.auto_update.is_some() {
        required = required | instance_bits::SET_AUTO_UPDATE;
    }
    if update.launch.is_some() || update.repository.is_some() || update.deploy.is_some() {
        required = required | instance_bits::SET_CONFIG;
    }
    if update.chat.is_some() {
        required = required | instance_bits::SET_CHAT_SETTINGS;
    }
    if held.instance.contains(required) {
        Ok(())
    } else {
        Err(Error::forbidden("missing instance rights for this update"))
    }
}

fn apply_simple_fields(record: &mut Instance, update: &InstanceUpdate) {
    if let Some(name) = &update.name {
        record.name = name.clone();
    }
    if let Some(autostart) = update.autostart {
        record.autostart = autostart;
    }
    if let Some(auto_update) = update.auto_update {
        record.auto_update = auto_update;
    }
    if let Some(launch) = &update.launch {
        record.launch = launch.clone();
    }
    if let Some(repository) = &update.repository {
        record.repository = repository.clone();
    }
    if let Some(deploy) = &update.deploy {
        record.deploy = deploy.clone();
    }
    if let Some(chat) = &update.chat {
        record.chat = chat.clone();
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Validation, message)
}

fn internal(err: impl std::fmt::Display) -> Error {
    Error::internal(err.to_string())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
