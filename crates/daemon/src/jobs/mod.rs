// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job manager: a cooperative scheduler for long-running operations.
//!
//! Registration is synchronous (the record is persisted before the
//! operation starts); execution happens in a dedicated task per job.
//! Cancellation is a flag the operation polls — the framework never
//! aborts executing logic. An executor that ignores its token past the
//! grace window is marked abandoned and its slot released.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gk_core::{
    Clock, Error, ErrorKind, InstanceId, InstanceUserRights, Job, JobId, JobOutcome,
    ProgressReporter, ProgressStream,
};

use crate::storage::Store;

/// How long a cancelled executor gets to unwind before the job is
/// marked abandoned.
const DEFAULT_ABANDON_GRACE: Duration = Duration::from_secs(30);

/// Handed to the code executing a job.
#[derive(Clone)]
pub struct JobContext {
    pub progress: ProgressReporter,
    pub token: CancellationToken,
}

struct RunningJob {
    token: CancellationToken,
    progress: ProgressStream,
}

pub struct JobManager<C: Clock> {
    store: Arc<Store>,
    clock: C,
    abandon_grace: Duration,
    running: Arc<Mutex<HashMap<JobId, RunningJob>>>,
}

impl<C: Clock> JobManager<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            abandon_grace: DEFAULT_ABANDON_GRACE,
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    #[cfg(test)]
    pub fn with_abandon_grace(store: Arc<Store>, clock: C, grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            abandon_grace: grace,
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Persist `job` and start `operation` in its own task.
    ///
    /// The returned record is the registered (running) job; callers hand
    /// it to the HTTP adapter as the 202 body.
    pub async fn register<F, Fut>(self: &Arc<Self>, job: Job, operation: F) -> Result<Job, Error>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let job_id = job.id.clone();
        let record = job.clone();
        self.store
            .mutate(|state| {
                state.jobs.insert(job_id.to_string(), job);
            })
            .await
            .map_err(|e| Error::internal(e.to_string()))?;

        let (progress, stream) = ProgressReporter::new();
        let token = CancellationToken::new();
        self.running.lock().insert(
            job_id.clone(),
            RunningJob { token: token.clone(), progress: stream },
        );

        let manager = Arc::clone(self);
        let ctx = JobContext { progress: progress.clone(), token: token.clone() };
        tokio::spawn(async move {
            info!(job = %job_id, "job started");
            let result = operation(ctx).await;
            let outcome = match result {
                Ok(()) => JobOutcome::Completed,
                Err(_) if token.is_cancelled() => JobOutcome::Cancelled,
                Err(e) => {
                    error!(job = %job_id, error = %e, "job failed");
                    JobOutcome::Errored { code: e.code, message: e.message }
                }
            };
            manager.finish(&job_id, outcome, progress.current()).await;
        });

        Ok(record)
    }

    async fn finish(&self, job_id: &JobId, outcome: JobOutcome, progress: u8) {
        // The slot may already be gone if the job was abandoned; the
        // record still gets its terminal state.
        let was_tracked = self.running.lock().remove(job_id).is_some();
        let epoch_ms = self.clock.epoch_ms();
        let persisted = self
            .store
            .mutate(|state| {
                if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                    job.report_progress(progress);
                    if outcome == JobOutcome::Completed {
                        job.report_progress(100);
                    }
                    job.finish(outcome.clone(), epoch_ms);
                }
            })
            .await;
        if let Err(e) = persisted {
            error!(job = %job_id, error = %e, "failed to persist job completion");
        }
        info!(job = %job_id, %outcome, tracked = was_tracked, "job finished");
    }

    /// Request cancellation.
    ///
    /// The caller must hold the job's cancel right on its instance, or be
    /// the user that started it. Cancelling a finished job is a no-op
    /// returning the terminal record.
    pub async fn cancel(
        self: &Arc<Self>,
        job_id: &JobId,
        user: &str,
        rights: Option<&InstanceUserRights>,
    ) -> Result<Job, Error> {
        let job = self
            .get(job_id)
            .ok_or_else(|| Error::gone(format!("no job {}", job_id)))?;
        if job.is_terminal() {
            return Ok(job);
        }

        let authorised = job.started_by == user
            || match (&job.cancel_right, rights) {
                (Some(required), Some(held)) => {
                    held.for_type(required.rights_type).contains(required.right)
                }
                (None, _) => false,
                (_, None) => false,
            };
        if !authorised {
            return Err(Error {
                kind: ErrorKind::Forbidden,
                code: Some(gk_core::ErrorCode::JobCancelForbidden),
                message: format!("{} may not cancel job {}", user, job_id),
            });
        }

        let token = {
            let running = self.running.lock();
            running.get(job_id).map(|r| r.token.clone())
        };
        self.store
            .mutate(|state| {
                if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                    job.cancel_requested = true;
                }
            })
            .await
            .map_err(|e| Error::internal(e.to_string()))?;

        if let Some(token) = token {
            token.cancel();
            self.spawn_abandon_watch(job_id.clone());
        }
        self.get(job_id)
            .ok_or_else(|| Error::gone(format!("no job {}", job_id)))
    }

    /// Framework-initiated cancellation (e.g. a superseded move job);
    /// skips the rights check.
    pub(crate) async fn cancel_unchecked(self: &Arc<Self>, job_id: &JobId) {
        let token = {
            let running = self.running.lock();
            running.get(job_id).map(|r| r.token.clone())
        };
        let result = self
            .store
            .mutate(|state| {
                if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                    job.cancel_requested = true;
                }
            })
            .await;
        if let Err(e) = result {
            error!(job = %job_id, error = %e, "failed to persist cancellation request");
        }
        if let Some(token) = token {
            token.cancel();
            self.spawn_abandon_watch(job_id.clone());
        }
    }

    /// After the grace window, a still-running executor forfeits its slot.
    fn spawn_abandon_watch(self: &Arc<Self>, job_id: JobId) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(manager.abandon_grace).await;
            let still_running = manager.running.lock().remove(&job_id).is_some();
            if !still_running {
                return;
            }
            warn!(job = %job_id, "cancelled executor did not stop; abandoning slot");
            let epoch_ms = manager.clock.epoch_ms();
            let result = manager
                .store
                .mutate(|state| {
                    if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                        job.abandoned = true;
                        job.finish(JobOutcome::Cancelled, epoch_ms);
                    }
                })
                .await;
            if let Err(e) = result {
                error!(job = %job_id, error = %e, "failed to persist abandonment");
            }
        });
    }

    /// Current record with live progress merged in.
    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        let live = {
            let running = self.running.lock();
            running.get(job_id).map(|r| *r.progress.borrow())
        };
        self.store.with(|state| {
            state.job(job_id).map(|job| {
                let mut job = job.clone();
                if let Some(progress) = live {
                    job.report_progress(progress);
                }
                job
            })
        })
    }

    /// All jobs, optionally filtered to one instance. Newest first.
    pub fn list(&self, instance: Option<&InstanceId>) -> Vec<Job> {
        let mut jobs = self.store.with(|state| {
            state
                .jobs
                .values()
                .filter(|job| match instance {
                    Some(id) => job.instance.as_ref() == Some(id),
                    None => true,
                })
                .cloned()
                .collect::<Vec<_>>()
        });
        for job in &mut jobs {
            let live = {
                let running = self.running.lock();
                running.get(&job.id).map(|r| *r.progress.borrow())
            };
            if let Some(progress) = live {
                job.report_progress(progress);
            }
        }
        jobs.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        jobs
    }

    /// Watch stream for one running job's progress.
    pub fn progress_stream(&self, job_id: &JobId) -> Option<ProgressStream> {
        self.running.lock().get(job_id).map(|r| r.progress.clone())
    }

    /// Startup sweep: jobs that were running when the daemon died cannot
    /// be resumed — they end cancelled.
    pub async fn sweep_interrupted(&self) -> Result<usize, Error> {
        let epoch_ms = self.clock.epoch_ms();
        self.store
            .mutate(|state| {
                let mut swept = 0;
                for job in state.jobs.values_mut() {
                    if !job.is_terminal() {
                        job.finish(JobOutcome::Cancelled, epoch_ms);
                        swept += 1;
                    }
                }
                swept
            })
            .await
            .map_err(|e| Error::internal(e.to_string()))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
