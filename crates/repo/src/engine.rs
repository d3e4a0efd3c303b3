// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repository engine: blocking VCS operations wrapped in cancellable
//! tasks with progress reporting.
//!
//! One mutating operation per repository at a time; readers share the
//! same lock. Network callbacks poll the cancellation token and abort
//! promptly. Every mutating operation removes untracked files on the way
//! out so revision state is always exactly what the tree contains.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::CheckoutBuilder;
use git2::{BranchType, ErrorCode, MergeOptions, ObjectType, Oid, Repository, Signature};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gk_core::progress::StageReporter;
use gk_core::{Event, InstanceId, ProgressReporter};

use crate::error::RepoError;

/// Plaintext credentials for origin access.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Identity written on merge commits and synchronize pushes.
#[derive(Debug, Clone)]
pub struct CommitterIdentity {
    pub name: String,
    pub email: String,
}

/// Read-only view of the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot {
    pub origin: String,
    pub head_sha: String,
    /// Friendly name of the current reference ("main", or the SHA when
    /// detached).
    pub reference: String,
    pub tracking_branch: bool,
}

/// Inputs for a test merge.
#[derive(Debug, Clone)]
pub struct TestMergeRequest {
    /// Pull-request number; fetched as `refs/pull/<N>/head`.
    pub number: u64,
    /// Explicit revision to merge; `None` uses the fetched branch tip.
    pub target_sha: Option<String>,
    pub comment: Option<String>,
}

/// Branch name used by synchronize when the tracked branch must not move.
const SYNC_SCRATCH_BRANCH: &str = "gk-sync";

/// Pre-synchronize hook; returning false vetoes the push.
pub type PreSyncHook = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

struct Inner {
    path: PathBuf,
    instance: InstanceId,
    events: broadcast::Sender<Event>,
    op_lock: tokio::sync::Mutex<()>,
}

/// Cooperative wrapper over one working copy.
#[derive(Clone)]
pub struct RepositoryEngine {
    inner: Arc<Inner>,
}

impl RepositoryEngine {
    pub fn new(path: PathBuf, instance: InstanceId, events: broadcast::Sender<Event>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                instance,
                events,
                op_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether a working copy exists at the engine's path.
    pub fn exists(&self) -> bool {
        self.inner.path.join(".git").exists()
    }

    /// Clone `url` into the engine's path.
    pub async fn clone_from(
        &self,
        url: String,
        reference: Option<String>,
        creds: Option<Credentials>,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<(), RepoError> {
        if self.exists() {
            return Err(RepoError::AlreadyCloned(self.inner.path.clone()));
        }
        let _guard = self.inner.op_lock.lock().await;
        let inner = self.inner.clone();
        run_blocking(move || {
            checkpoint(&token)?;
            let mut fetch = git2::FetchOptions::new();
            fetch.remote_callbacks(remote_callbacks(
                creds.clone(),
                Some(reporter.stage(0, 100)),
                token.clone(),
            ));
            let mut builder = git2::build::RepoBuilder::new();
            builder.fetch_options(fetch);
            if let Some(reference) = &reference {
                builder.branch(reference);
            }
            builder
                .clone(&url, &inner.path)
                .map_err(|e| map_git(e, &token, RepoError::Clone))?;
            reporter.report(100);
            info!(instance = %inner.instance, %url, "repository cloned");
            Ok(())
        })
        .await
    }

    /// Fetch the origin remote's tracked references.
    pub async fn fetch_origin(
        &self,
        creds: Option<Credentials>,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<(), RepoError> {
        let instance = self.inner.instance.clone();
        let events = self.inner.events.clone();
        self.with_repo(move |repo| {
            fetch_refspecs(repo, &[], creds, Some(reporter.stage(0, 100)), &token)?;
            reporter.report(100);
            let _ = events.send(Event::RepoFetch { instance });
            Ok(())
        })
        .await
    }

    /// Check out a committish (branch name, tag, or SHA).
    pub async fn checkout(
        &self,
        committish: String,
        token: CancellationToken,
    ) -> Result<(), RepoError> {
        self.with_repo(move |repo| {
            checkpoint(&token)?;
            clean_untracked(repo)?;
            let (object, reference) = repo
                .revparse_ext(&committish)
                .map_err(|_| RepoError::Unresolvable(committish.clone()))?;
            repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))
                .map_err(RepoError::Checkout)?;
            match reference.and_then(|r| r.name().map(str::to_string)) {
                Some(name) => repo.set_head(&name).map_err(RepoError::Checkout)?,
                None => repo
                    .set_head_detached(object.id())
                    .map_err(RepoError::Checkout)?,
            }
            clean_untracked(repo)?;
            Ok(())
        })
        .await
    }

    /// Hard reset the working tree to a specific revision.
    pub async fn reset_to_sha(
        &self,
        sha: String,
        token: CancellationToken,
    ) -> Result<(), RepoError> {
        self.with_repo(move |repo| {
            checkpoint(&token)?;
            let oid = Oid::from_str(&sha).map_err(|_| RepoError::Unresolvable(sha.clone()))?;
            reset_hard(repo, oid)?;
            clean_untracked(repo)?;
            Ok(())
        })
        .await
    }

    /// Fetch origin and hard reset to the tracked branch's tip.
    pub async fn reset_to_origin(
        &self,
        creds: Option<Credentials>,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<(), RepoError> {
        self.with_repo(move |repo| {
            fetch_refspecs(repo, &[], creds, Some(reporter.stage(0, 80)), &token)?;
            checkpoint(&token)?;
            let upstream = upstream_tip(repo)?;
            reset_hard(repo, upstream)?;
            clean_untracked(repo)?;
            reporter.report(100);
            Ok(())
        })
        .await
    }

    /// Merge a pull request's head (or an explicit revision from it) onto
    /// the current head.
    ///
    /// Returns `Ok(None)` when the merge conflicts (the tree is rolled
    /// back to the recorded head), `Ok(Some(true))` when a fast-forward
    /// would have sufficed, and `Ok(Some(false))` when a real merge
    /// commit was produced. The temporary `pr-<N>` branch is deleted on
    /// every path.
    pub async fn merge_test_revision(
        &self,
        request: TestMergeRequest,
        committer: CommitterIdentity,
        creds: Option<Credentials>,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<Option<bool>, RepoError> {
        let instance = self.inner.instance.clone();
        let events = self.inner.events.clone();
        self.with_repo(move |repo| {
            checkpoint(&token)?;
            clean_untracked(repo)?;

            // 1. Record the current head.
            let head = repo.head()?;
            let head_oid = head.peel_to_commit().map_err(RepoError::Git)?.id();
            let head_reference = head.shorthand().unwrap_or("HEAD").to_string();
            let on_branch = head.is_branch();
            drop(head);

            // 2. Fetch the pull request head into a temporary branch.
            let branch = format!("pr-{}", request.number);
            let refspec = format!("+refs/pull/{}/head:refs/heads/{}", request.number, branch);
            fetch_refspecs(
                repo,
                &[refspec.as_str()],
                creds,
                Some(reporter.stage(0, 50)),
                &token,
            )?;
            reporter.report(50);

            let result = merge_revision_inner(
                repo,
                &request,
                &committer,
                &branch,
                head_oid,
                &head_reference,
                on_branch,
                &reporter,
                &token,
                &events,
                &instance,
            );

            // 6. The temporary branch goes away even on failure.
            if let Ok(mut b) = repo.find_branch(&branch, BranchType::Local) {
                let _ = b.delete();
            }
            clean_untracked(repo)?;
            result
        })
        .await
    }

    /// Merge the tracked origin branch onto the current head. Returns the
    /// new head SHA, or `None` on conflict (tree rolled back).
    pub async fn merge_origin(
        &self,
        committer: CommitterIdentity,
        creds: Option<Credentials>,
        reporter: ProgressReporter,
        token: CancellationToken,
    ) -> Result<Option<String>, RepoError> {
        let instance = self.inner.instance.clone();
        let events = self.inner.events.clone();
        self.with_repo(move |repo| {
            checkpoint(&token)?;
            clean_untracked(repo)?;
            fetch_refspecs(repo, &[], creds, Some(reporter.stage(0, 50)), &token)?;
            reporter.report(50);

            let head = repo.head()?;
            let head_oid = head.peel_to_commit().map_err(RepoError::Git)?.id();
            let head_reference = head.shorthand().unwrap_or("HEAD").to_string();
            drop(head);
            let upstream_oid = upstream_tip(repo)?;

            // Nothing to merge when the head already contains origin.
            if head_oid == upstream_oid || repo.graph_descendant_of(head_oid, upstream_oid)? {
                reporter.report(100);
                return Ok(Some(head_oid.to_string()));
            }

            let head_commit = repo.find_commit(head_oid).map_err(RepoError::Git)?;
            let their_commit = repo.find_commit(upstream_oid).map_err(RepoError::Git)?;
            let mut opts = MergeOptions::new();
            opts.fail_on_conflict(true);
            opts.skip_reuc(true);

            let merged = repo.merge_commits(&head_commit, &their_commit, Some(&opts));
            let mut index = match merged {
                Err(e) if is_conflict(&e) => {
                    reset_hard(repo, head_oid)?;
                    clean_untracked(repo)?;
                    let _ = events.send(Event::RepoMergeConflict {
                        instance: instance.clone(),
                        head_sha: head_oid.to_string(),
                        target: upstream_oid.to_string(),
                        head_reference,
                        branch: "origin".to_string(),
                    });
                    return Ok(None);
                }
                Err(e) => return Err(RepoError::Merge(e)),
                Ok(index) => index,
            };
            checkpoint(&token)?;

            let new_oid = commit_merge(
                repo,
                &mut index,
                &committer,
                &format!("Merge origin into {}", head_reference),
                &[&head_commit, &their_commit],
            )?;
            force_head_checkout(repo)?;
            clean_untracked(repo)?;
            reporter.report(100);
            Ok(Some(new_oid.to_string()))
        })
        .await
    }

    /// Push local state back to origin.
    ///
    /// Without credentials this is a no-op returning false. The pre-sync
    /// hook may veto; a veto hard-resets to the pre-hook head and returns
    /// false. Push failures (including non-fast-forward) are logged and
    /// return false — never raised. When `push_tracked_branch` is false
    /// the head is pushed to a scratch branch which is then deleted,
    /// forcing origin to observe the exact working-tree state without
    /// disturbing the tracked branch.
    pub async fn synchronize(
        &self,
        creds: Option<Credentials>,
        committer: CommitterIdentity,
        push_tracked_branch: bool,
        pre_sync: PreSyncHook,
        token: CancellationToken,
    ) -> Result<bool, RepoError> {
        let Some(creds) = creds else {
            return Ok(false);
        };
        let path = self.inner.path.clone();
        self.with_repo(move |repo| {
            checkpoint(&token)?;
            let mut config = repo.config().map_err(RepoError::Git)?;
            config
                .set_str("user.name", &committer.name)
                .map_err(RepoError::Git)?;
            config
                .set_str("user.email", &committer.email)
                .map_err(RepoError::Git)?;

            let head = repo.head()?;
            let head_oid = head.peel_to_commit().map_err(RepoError::Git)?.id();
            let head_reference = head.shorthand().unwrap_or("HEAD").to_string();
            let on_branch = head.is_branch();
            drop(head);

            if !pre_sync(&path) {
                reset_hard(repo, head_oid)?;
                clean_untracked(repo)?;
                return Ok(false);
            }
            checkpoint(&token)?;

            if !on_branch {
                warn!("synchronize skipped: detached head");
                return Ok(false);
            }
            let refspecs: Vec<String> = if push_tracked_branch {
                vec![format!(
                    "refs/heads/{0}:refs/heads/{0}",
                    head_reference
                )]
            } else {
                vec![format!(
                    "+refs/heads/{}:refs/heads/{}",
                    head_reference, SYNC_SCRATCH_BRANCH
                )]
            };

            let pushed = push_refspecs(repo, &refspecs, &creds, &token);
            if !push_tracked_branch && pushed {
                // Drop the scratch branch; failure here is cosmetic.
                let delete = format!(":refs/heads/{}", SYNC_SCRATCH_BRANCH);
                push_refspecs(repo, &[delete], &creds, &token);
            }
            Ok(pushed)
        })
        .await
    }

    /// True when `committish` resolves directly to a commit — not via a
    /// tag or branch reference.
    pub async fn is_sha(&self, committish: String) -> Result<bool, RepoError> {
        self.with_repo(move |repo| match repo.revparse_ext(&committish) {
            Ok((object, reference)) => {
                Ok(reference.is_none() && object.kind() == Some(ObjectType::Commit))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(RepoError::Git(e)),
        })
        .await
    }

    /// Current origin/head/reference view.
    pub async fn snapshot(&self) -> Result<RepositorySnapshot, RepoError> {
        self.with_repo(|repo| {
            let origin = repo
                .find_remote("origin")
                .map_err(|_| RepoError::NoOrigin)?
                .url()
                .unwrap_or_default()
                .to_string();
            let head = repo.head()?;
            let head_sha = head.peel_to_commit().map_err(RepoError::Git)?.id().to_string();
            let reference = head.shorthand().unwrap_or("HEAD").to_string();
            let tracking_branch = head.is_branch()
                && git2::Branch::wrap(repo.head()?).upstream().is_ok();
            Ok(RepositorySnapshot {
                origin,
                head_sha,
                reference,
                tracking_branch,
            })
        })
        .await
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T, RepoError> + Send + 'static,
    {
        let _guard = self.inner.op_lock.lock().await;
        let inner = self.inner.clone();
        run_blocking(move || {
            let repo = Repository::open(&inner.path).map_err(|source| RepoError::Open {
                path: inner.path.clone(),
                source,
            })?;
            f(&repo)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, RepoError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RepoError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RepoError::Internal(e.to_string()))?
}

#[allow(clippy::too_many_arguments)]
fn merge_revision_inner(
    repo: &Repository,
    request: &TestMergeRequest,
    committer: &CommitterIdentity,
    branch: &str,
    head_oid: Oid,
    head_reference: &str,
    on_branch: bool,
    reporter: &ProgressReporter,
    token: &CancellationToken,
    events: &broadcast::Sender<Event>,
    instance: &InstanceId,
) -> Result<Option<bool>, RepoError> {
    // 3. Resolve the target revision.
    let target_name;
    let target_oid = match &request.target_sha {
        Some(sha) => {
            target_name = sha.clone();
            Oid::from_str(sha).map_err(|_| RepoError::Unresolvable(sha.clone()))?
        }
        None => {
            target_name = branch.to_string();
            repo.refname_to_id(&format!("refs/heads/{}", branch))
                .map_err(|_| RepoError::Unresolvable(branch.to_string()))?
        }
    };
    checkpoint(token)?;

    let head_commit = repo.find_commit(head_oid).map_err(RepoError::Git)?;
    let target_commit = repo
        .find_commit(target_oid)
        .map_err(|_| RepoError::Unresolvable(target_name.clone()))?;
    let fast_forward_possible = repo.graph_descendant_of(target_oid, head_oid)?;

    let mut opts = MergeOptions::new();
    opts.fail_on_conflict(true);
    opts.skip_reuc(true);

    let merged = repo.merge_commits(&head_commit, &target_commit, Some(&opts));
    let mut index = match merged {
        Err(e) if is_conflict(&e) => {
            // 4. Conflict: roll back and report, not an error.
            reset_hard(repo, head_oid)?;
            let _ = events.send(Event::RepoMergeConflict {
                instance: instance.clone(),
                head_sha: head_oid.to_string(),
                target: target_name,
                head_reference: head_reference.to_string(),
                branch: branch.to_string(),
            });
            warn!(instance = %instance, pr = request.number, "test merge conflicted, rolled back");
            return Ok(None);
        }
        Err(e) => return Err(RepoError::Merge(e)),
        Ok(index) => index,
    };
    checkpoint(token)?;

    // 5. Commit with the caller-supplied identity.
    let mut message = format!("Test merge of pull request #{}", request.number);
    if let Some(comment) = &request.comment {
        message.push_str("\n\n");
        message.push_str(comment);
    }
    let new_oid = commit_merge(
        repo,
        &mut index,
        committer,
        &message,
        &[&head_commit, &target_commit],
    )?;
    if !on_branch {
        repo.set_head_detached(new_oid).map_err(RepoError::Checkout)?;
    }
    force_head_checkout(repo)?;
    reporter.report(100);

    let _ = events.send(Event::RepoMergePullRequest {
        instance: instance.clone(),
        number: request.number,
        sha: new_oid.to_string(),
        fast_forward: fast_forward_possible,
    });
    info!(
        instance = %instance,
        pr = request.number,
        sha = %new_oid,
        fast_forward = fast_forward_possible,
        "test merge complete"
    );
    Ok(Some(fast_forward_possible))
}

/// Commit a merged index onto HEAD (or detached head handled by caller).
fn commit_merge(
    repo: &Repository,
    index: &mut git2::Index,
    committer: &CommitterIdentity,
    message: &str,
    parents: &[&git2::Commit<'_>],
) -> Result<Oid, RepoError> {
    if index.has_conflicts() {
        return Err(RepoError::Merge(git2::Error::from_str(
            "merge index has conflicts",
        )));
    }
    let tree_oid = index.write_tree_to(repo).map_err(RepoError::Commit)?;
    let tree = repo.find_tree(tree_oid).map_err(RepoError::Commit)?;
    let sig = Signature::now(&committer.name, &committer.email).map_err(RepoError::Commit)?;
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, parents)
        .map_err(RepoError::Commit)
}

/// Fetch from origin. Empty `refspecs` uses the remote's configured set.
fn fetch_refspecs(
    repo: &Repository,
    refspecs: &[&str],
    creds: Option<Credentials>,
    stage: Option<StageReporter>,
    token: &CancellationToken,
) -> Result<(), RepoError> {
    checkpoint(token)?;
    let mut remote = repo.find_remote("origin").map_err(|_| RepoError::NoOrigin)?;
    let mut options = git2::FetchOptions::new();
    options.remote_callbacks(remote_callbacks(creds, stage, token.clone()));
    remote
        .fetch(refspecs, Some(&mut options), None)
        .map_err(|e| map_git(e, token, RepoError::Fetch))
}

/// Push refspecs to origin; failures are logged and reported as false.
fn push_refspecs(
    repo: &Repository,
    refspecs: &[impl AsRef<str>],
    creds: &Credentials,
    token: &CancellationToken,
) -> bool {
    let mut remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(_) => {
            warn!("synchronize skipped: no origin remote");
            return false;
        }
    };

    let rejected = std::cell::Cell::new(false);
    let mut callbacks = remote_callbacks(Some(creds.clone()), None, token.clone());
    callbacks.push_update_reference(|refname, status| {
        if let Some(message) = status {
            warn!(refname, message, "push rejected");
            rejected.set(true);
        }
        Ok(())
    });
    let mut options = git2::PushOptions::new();
    options.remote_callbacks(callbacks);

    let refspecs: Vec<&str> = refspecs.iter().map(|r| r.as_ref()).collect();
    match remote.push(&refspecs, Some(&mut options)) {
        Ok(()) if !rejected.get() => true,
        Ok(()) => false,
        Err(e) => {
            warn!(error = %e, "synchronize push failed");
            false
        }
    }
}

fn remote_callbacks<'cb>(
    creds: Option<Credentials>,
    stage: Option<StageReporter>,
    token: CancellationToken,
) -> git2::RemoteCallbacks<'cb> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        if allowed.is_user_pass_plaintext() {
            if let Some(creds) = &creds {
                return git2::Cred::userpass_plaintext(&creds.username, &creds.password);
            }
        }
        if allowed.is_ssh_key() {
            if let Some(user) = username_from_url {
                return git2::Cred::ssh_key_from_agent(user);
            }
        }
        git2::Cred::default()
    });
    callbacks.transfer_progress(move |progress| {
        if token.is_cancelled() {
            return false;
        }
        if let Some(stage) = &stage {
            let total = progress.total_objects().max(1);
            let pct = progress.received_objects() * 100 / total;
            stage.report(pct as u8);
        }
        true
    });
    callbacks
}

fn checkpoint(token: &CancellationToken) -> Result<(), RepoError> {
    if token.is_cancelled() {
        Err(RepoError::Cancelled)
    } else {
        Ok(())
    }
}

fn map_git(
    err: git2::Error,
    token: &CancellationToken,
    wrap: fn(git2::Error) -> RepoError,
) -> RepoError {
    if token.is_cancelled() {
        RepoError::Cancelled
    } else {
        wrap(err)
    }
}

fn is_conflict(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::Conflict | ErrorCode::MergeConflict)
        || err.class() == git2::ErrorClass::Merge
}

fn reset_hard(repo: &Repository, oid: Oid) -> Result<(), RepoError> {
    let object = repo.find_object(oid, None).map_err(RepoError::Reset)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.reset(&object, git2::ResetType::Hard, Some(&mut checkout))
        .map_err(RepoError::Reset)
}

fn force_head_checkout(repo: &Repository) -> Result<(), RepoError> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
        .map_err(RepoError::Checkout)
}

/// Tip of the branch the current head tracks.
fn upstream_tip(repo: &Repository) -> Result<Oid, RepoError> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(RepoError::Unresolvable("HEAD is detached".to_string()));
    }
    let branch = git2::Branch::wrap(head);
    let upstream = branch
        .upstream()
        .map_err(|_| RepoError::Unresolvable("no tracking branch".to_string()))?;
    upstream
        .get()
        .target()
        .ok_or_else(|| RepoError::Unresolvable("tracking branch has no target".to_string()))
}

/// Delete untracked and ignored files so the tree matches revision state.
fn clean_untracked(repo: &Repository) -> Result<(), RepoError> {
    let Some(workdir) = repo.workdir() else {
        return Ok(());
    };
    let mut options = git2::StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(false)
        .include_ignored(true);
    let statuses = repo.statuses(Some(&mut options)).map_err(RepoError::Git)?;
    for entry in statuses.iter() {
        let status = entry.status();
        if !status.contains(git2::Status::WT_NEW) && !status.contains(git2::Status::IGNORED) {
            continue;
        }
        let Some(rel) = entry.path() else { continue };
        let target = workdir.join(rel);
        let clean_err = |source| RepoError::Clean {
            path: target.clone(),
            source,
        };
        let result = if target.is_dir() {
            std::fs::remove_dir_all(&target)
        } else {
            std::fs::remove_file(&target)
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(clean_err(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
