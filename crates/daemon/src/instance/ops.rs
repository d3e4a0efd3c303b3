// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-running instance operations, registered through the job manager.
//!
//! Each operation here is what the HTTP adapter dispatches on a 202
//! route: it builds a [`Job`], captures the components it needs, and
//! hands the job manager a future that polls its token and reports
//! progress.

use std::sync::Arc;

use tracing::info;

use gk_core::rights::{deployment as deployment_bits, repository as repository_bits};
use gk_core::{
    CancelRight, Clock, Deployment, DeploymentId, Error, ErrorKind, Event, InstanceId, Job,
    RevisionInformation, RightsType, TestMerge,
};
use gk_repo::{CommitterIdentity, Credentials, TestMergeRequest};

use crate::instance::manager::InstanceManager;
use crate::instance::InstanceService;
use crate::jobs::JobContext;

fn committer_of(record: &gk_core::Instance) -> CommitterIdentity {
    CommitterIdentity {
        name: record.repository.committer_name.clone(),
        email: record.repository.committer_email.clone(),
    }
}

fn credentials_of(record: &gk_core::Instance) -> Option<Credentials> {
    match (&record.repository.access_user, &record.repository.access_token) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

impl<C: Clock> InstanceManager<C> {
    /// Clone the configured origin into the instance's repository.
    pub async fn repo_clone(
        self: &Arc<Self>,
        user: &str,
        id: &InstanceId,
        reference: Option<String>,
    ) -> Result<Job, Error> {
        let record = self.get(id)?;
        let service = self.service(id).await?;
        let origin = record
            .repository
            .origin
            .clone()
            .ok_or_else(|| Error::new(ErrorKind::Validation, "no origin configured"))?;
        let creds = credentials_of(&record);

        let job = Job::new(
            Some(id.clone()),
            format!("Clone {}", origin),
            user,
            Some(CancelRight {
                rights_type: RightsType::Repository,
                right: repository_bits::CANCEL_JOBS,
            }),
            self.clock(),
        );
        let repository = service.repository.clone();
        self.jobs()
            .register(job, move |ctx: JobContext| async move {
                repository
                    .clone_from(origin, reference, creds, ctx.progress, ctx.token)
                    .await
                    .map_err(|e| Error::internal(e.to_string()))
            })
            .await
    }

    /// Fetch origin refs.
    pub async fn repo_fetch(self: &Arc<Self>, user: &str, id: &InstanceId) -> Result<Job, Error> {
        let record = self.get(id)?;
        let service = self.service(id).await?;
        let creds = credentials_of(&record);

        let job = Job::new(
            Some(id.clone()),
            "Fetch origin",
            user,
            Some(CancelRight {
                rights_type: RightsType::Repository,
                right: repository_bits::CANCEL_JOBS,
            }),
            self.clock(),
        );
        let repository = service.repository.clone();
        self.jobs()
            .register(job, move |ctx: JobContext| async move {
                repository
                    .fetch_origin(creds, ctx.progress, ctx.token)
                    .await
                    .map_err(|e| Error::internal(e.to_string()))
            })
            .await
    }

    /// Test-merge a pull request onto the current head. A conflict is a
    /// job *completion* (the merge resolves to "no"), not a job failure.
    pub async fn test_merge(
        self: &Arc<Self>,
        user: &str,
        id: &InstanceId,
        request: TestMergeRequest,
    ) -> Result<Job, Error> {
        let record = self.get(id)?;
        let service = self.service(id).await?;
        let creds = credentials_of(&record);
        let committer = committer_of(&record);

        let job = Job::new(
            Some(id.clone()),
            format!("Test merge #{}", request.number),
            user,
            Some(CancelRight {
                rights_type: RightsType::Repository,
                right: repository_bits::CANCEL_JOBS,
            }),
            self.clock(),
        );
        let repository = service.repository.clone();
        let merged_by = user.to_string();
        let clock_ms = self.clock().epoch_ms();
        self.jobs()
            .register(job, move |ctx: JobContext| async move {
                let number = request.number;
                let target_sha = request.target_sha.clone();
                let comment = request.comment.clone();
                let outcome = repository
                    .merge_test_revision(request, committer, creds, ctx.progress, ctx.token)
                    .await
                    .map_err(|e| Error::internal(e.to_string()))?;
                if outcome.is_some() {
                    service.test_merges.lock().push(TestMerge {
                        number,
                        target_sha,
                        comment,
                        merged_by,
                        merged_at_ms: clock_ms,
                    });
                }
                Ok(())
            })
            .await
    }

    /// Compile the current revision and stage it as the latest
    /// deployment; an online watchdog hot-swaps onto it.
    pub async fn deploy(self: &Arc<Self>, user: &str, id: &InstanceId) -> Result<Job, Error> {
        let record = self.get(id)?;
        let service = self.service(id).await?;

        let job = Job::new(
            Some(id.clone()),
            "Compile and stage deployment",
            user,
            Some(CancelRight {
                rights_type: RightsType::Deployment,
                right: deployment_bits::CANCEL_JOBS,
            }),
            self.clock(),
        );
        let bus = self.bus().clone();
        let instance = id.clone();
        let deploy_settings = record.deploy.clone();
        let clock_ms = self.clock().epoch_ms();
        self.jobs()
            .register(job, move |ctx: JobContext| async move {
                bus.publish(Event::DeployStarted { instance: instance.clone() });
                match run_deploy(&service, &deploy_settings, clock_ms, &ctx).await {
                    Ok(deployment) => {
                        bus.publish(Event::DeployComplete {
                            instance: instance.clone(),
                            deployment: deployment.id.clone(),
                        });
                        // Hot-swap a live watchdog onto the new artifacts.
                        if service.watchdog.status() == crate::watchdog::WatchdogStatus::Online {
                            service.watchdog.swap_to_latest(&ctx.token).await?;
                        }
                        Ok(())
                    }
                    Err(e) => {
                        bus.publish(Event::DeployFailed {
                            instance: instance.clone(),
                            error: e.to_string(),
                        });
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Launch the watchdog.
    pub async fn launch(self: &Arc<Self>, user: &str, id: &InstanceId) -> Result<Job, Error> {
        let record = self.get(id)?;
        let service = self.service(id).await?;
        if !record.online {
            return Err(Error::new(
                ErrorKind::Conflict,
                "instance must be online to launch its watchdog",
            ));
        }

        let job = Job::new(
            Some(id.clone()),
            "Launch watchdog",
            user,
            Some(CancelRight {
                rights_type: RightsType::Watchdog,
                right: gk_core::rights::watchdog::CANCEL_JOBS,
            }),
            self.clock(),
        );
        let params = record.launch.clone();
        self.jobs()
            .register(job, move |ctx: JobContext| async move {
                service.watchdog.start(params, false, &ctx.token).await
            })
            .await
    }

    /// Restart with the latest deployment, zero-downtime.
    pub async fn restart(self: &Arc<Self>, user: &str, id: &InstanceId) -> Result<Job, Error> {
        let service = self.service(id).await?;
        let job = Job::new(
            Some(id.clone()),
            "Restart with latest deployment",
            user,
            Some(CancelRight {
                rights_type: RightsType::Watchdog,
                right: gk_core::rights::watchdog::CANCEL_JOBS,
            }),
            self.clock(),
        );
        self.jobs()
            .register(job, move |ctx: JobContext| async move {
                service.watchdog.swap_to_latest(&ctx.token).await
            })
            .await
    }
}

/// Stage the working tree into both slot directories and register the
/// deployment. The compiler itself is provisioned with the toolchain;
/// when its binary is absent the tree is staged as-is (artifacts
/// prebuilt in the repository).
async fn run_deploy(
    service: &Arc<InstanceService>,
    settings: &gk_core::instance::DeploySettings,
    epoch_ms: u64,
    ctx: &JobContext,
) -> Result<Deployment, Error> {
    let _serial = service.serial.lock().await;
    let snapshot = service
        .repository
        .snapshot()
        .await
        .map_err(|e| Error::internal(e.to_string()))?;
    ctx.progress.report(10);

    let deployment = Deployment {
        id: DeploymentId::generate(),
        revision: RevisionInformation {
            sha: snapshot.head_sha.clone(),
            origin_sha: snapshot.head_sha.clone(),
            active_test_merges: service.test_merges.lock().clone(),
        },
        minimum_security: settings.minimum_security,
        toolchain_version: settings.toolchain_version.clone(),
        artifact: format!("{}.dmb", settings.project_name),
        created_at_ms: epoch_ms,
    };

    let dirs = service.deployments.stage(&deployment.id).await?;
    if ctx.token.is_cancelled() {
        return Err(Error::new(ErrorKind::Transient, "deploy cancelled"));
    }

    let repo_path = service.repository.path().to_path_buf();
    gk_adapters::io::copy_dir(&repo_path, &dirs.primary, &[".git"])
        .await
        .map_err(|e| Error::internal(e.to_string()))?;
    ctx.progress.report(55);
    if ctx.token.is_cancelled() {
        return Err(Error::new(ErrorKind::Transient, "deploy cancelled"));
    }
    gk_adapters::io::copy_dir(&repo_path, &dirs.secondary, &[".git"])
        .await
        .map_err(|e| Error::internal(e.to_string()))?;
    ctx.progress.report(90);

    // Metadata beside the staging dirs lets a restarted daemon re-adopt
    // the deployment.
    let metadata = serde_json::to_vec_pretty(&deployment)
        .map_err(|e| Error::internal(e.to_string()))?;
    let metadata_path = service
        .deployments
        .root()
        .join(deployment.id.as_str())
        .join("deployment.json");
    gk_adapters::io::atomic_write(&metadata_path, &metadata)
        .await
        .map_err(|e| Error::internal(e.to_string()))?;

    service.deployments.commit(deployment.clone());
    service.chat.load_custom_commands(&dirs.primary).await;
    ctx.progress.report(100);
    info!(deployment = %deployment.id, sha = %deployment.revision.sha, "deployment staged");
    Ok(deployment)
}
