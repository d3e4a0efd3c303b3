// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gk_core::ProgressReporter;
use std::path::Path as StdPath;

fn sig() -> Signature<'static> {
    Signature::now("Test", "test@example.com").unwrap()
}

fn committer() -> CommitterIdentity {
    CommitterIdentity { name: "Gamekeeper".to_string(), email: "gk@example.com".to_string() }
}

fn no_op_hook() -> PreSyncHook {
    Arc::new(|_: &StdPath| true)
}

/// Stage `name` with `contents` and commit it onto HEAD.
fn commit_file(repo: &Repository, name: &str, contents: &str, msg: &str) -> Oid {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(StdPath::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig(), &sig(), msg, &tree, &parents).unwrap()
}

/// Commit on an explicit parent without moving any branch (simulates a
/// pull-request head).
fn commit_on_parent(repo: &Repository, parent: Oid, name: &str, contents: &str) -> Oid {
    let parent_commit = repo.find_commit(parent).unwrap();
    let mut builder = repo.treebuilder(Some(&parent_commit.tree().unwrap())).unwrap();
    let blob = repo.blob(contents.as_bytes()).unwrap();
    builder.insert(name, blob, 0o100_644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    repo.commit(None, &sig(), &sig(), "pr commit", &tree, &[&parent_commit]).unwrap()
}

struct Fixture {
    _dir: tempfile::TempDir,
    upstream: Repository,
    upstream_head: Oid,
    engine: RepositoryEngine,
    events: broadcast::Receiver<Event>,
    work_path: PathBuf,
}

async fn cloned_fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut init = git2::RepositoryInitOptions::new();
    init.initial_head("main");
    let upstream = Repository::init_opts(dir.path().join("origin"), &init).unwrap();
    let upstream_head = commit_file(&upstream, "data.txt", "base\n", "initial");

    let (tx, events) = broadcast::channel(32);
    let work_path = dir.path().join("work");
    let engine =
        RepositoryEngine::new(work_path.clone(), InstanceId::from("ins-test"), tx);

    let (reporter, stream) = ProgressReporter::new();
    engine
        .clone_from(
            dir.path().join("origin").display().to_string(),
            None,
            None,
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(*stream.borrow(), 100);

    Fixture { _dir: dir, upstream, upstream_head, engine, events, work_path }
}

fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn clone_and_snapshot() {
    let fx = cloned_fixture().await;
    let snapshot = fx.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.head_sha, fx.upstream_head.to_string());
    assert_eq!(snapshot.reference, "main");
    assert!(snapshot.tracking_branch);
    assert!(snapshot.origin.contains("origin"));
}

#[tokio::test]
async fn clone_twice_errors() {
    let fx = cloned_fixture().await;
    let (reporter, _) = ProgressReporter::new();
    let err = fx
        .engine
        .clone_from(
            "ignored".to_string(),
            None,
            None,
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::AlreadyCloned(_)));
}

#[tokio::test]
async fn is_sha_distinguishes_commits_from_refs() {
    let fx = cloned_fixture().await;
    let sha = fx.upstream_head.to_string();
    assert!(fx.engine.is_sha(sha).await.unwrap());
    assert!(!fx.engine.is_sha("main".to_string()).await.unwrap());
    assert!(!fx.engine.is_sha("no-such-thing".to_string()).await.unwrap());

    // A tag resolves through a reference, so it is not a SHA.
    {
        let work = Repository::open(&fx.work_path).unwrap();
        let head = work.head().unwrap().peel_to_commit().unwrap();
        work.tag_lightweight("v1", head.as_object(), false).unwrap();
    }
    assert!(!fx.engine.is_sha("v1".to_string()).await.unwrap());
}

#[tokio::test]
async fn merge_test_revision_fast_forward() {
    let mut fx = cloned_fixture().await;
    let pr_head = commit_on_parent(&fx.upstream, fx.upstream_head, "feature.txt", "new\n");
    fx.upstream.reference("refs/pull/7/head", pr_head, true, "pr 7").unwrap();

    let (reporter, stream) = ProgressReporter::new();
    let outcome = fx
        .engine
        .merge_test_revision(
            TestMergeRequest { number: 7, target_sha: None, comment: None },
            committer(),
            None,
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, Some(true));
    assert_eq!(*stream.borrow(), 100);
    assert!(fx.work_path.join("feature.txt").exists());

    // Temporary branch removed; one merge event emitted.
    let work = Repository::open(&fx.work_path).unwrap();
    assert!(work.find_branch("pr-7", BranchType::Local).is_err());
    let events = drain_events(&mut fx.events);
    assert!(matches!(
        events.as_slice(),
        [Event::RepoMergePullRequest { number: 7, fast_forward: true, .. }]
    ));
}

#[tokio::test]
async fn merge_test_revision_produces_merge_commit_when_diverged() {
    let mut fx = cloned_fixture().await;
    // Local head advances on a different file than the PR.
    {
        let work = Repository::open(&fx.work_path).unwrap();
        commit_file(&work, "local.txt", "local\n", "local work");
    }
    let pr_head = commit_on_parent(&fx.upstream, fx.upstream_head, "feature.txt", "new\n");
    fx.upstream.reference("refs/pull/8/head", pr_head, true, "pr 8").unwrap();

    let (reporter, _) = ProgressReporter::new();
    let outcome = fx
        .engine
        .merge_test_revision(
            TestMergeRequest {
                number: 8,
                target_sha: None,
                comment: Some("try it".to_string()),
            },
            committer(),
            None,
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, Some(false));
    assert!(fx.work_path.join("feature.txt").exists());
    assert!(fx.work_path.join("local.txt").exists());

    let events = drain_events(&mut fx.events);
    assert!(matches!(
        events.as_slice(),
        [Event::RepoMergePullRequest { number: 8, fast_forward: false, .. }]
    ));
}

#[tokio::test]
async fn merge_conflict_rolls_back_and_reports() {
    let mut fx = cloned_fixture().await;
    let pre_merge = {
        let work = Repository::open(&fx.work_path).unwrap();
        commit_file(&work, "data.txt", "ours\n", "our change")
    };
    let pr_head = commit_on_parent(&fx.upstream, fx.upstream_head, "data.txt", "theirs\n");
    fx.upstream.reference("refs/pull/9/head", pr_head, true, "pr 9").unwrap();

    let (reporter, _) = ProgressReporter::new();
    let outcome = fx
        .engine
        .merge_test_revision(
            TestMergeRequest { number: 9, target_sha: None, comment: None },
            committer(),
            None,
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, None);

    // Head restored, tree clean, temp branch gone.
    let snapshot = fx.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.head_sha, pre_merge.to_string());
    assert_eq!(
        std::fs::read_to_string(fx.work_path.join("data.txt")).unwrap(),
        "ours\n"
    );
    let work = Repository::open(&fx.work_path).unwrap();
    assert!(work.find_branch("pr-9", BranchType::Local).is_err());
    assert!(work.statuses(None).unwrap().is_empty());

    let events = drain_events(&mut fx.events);
    match events.as_slice() {
        [Event::RepoMergeConflict { head_sha, target, head_reference, branch, .. }] => {
            assert_eq!(head_sha, &pre_merge.to_string());
            assert_eq!(target, "pr-9");
            assert_eq!(head_reference, "main");
            assert_eq!(branch, "pr-9");
        }
        other => panic!("expected one conflict event, got {:?}", other),
    }
}

#[tokio::test]
async fn merge_test_revision_with_explicit_sha() {
    let mut fx = cloned_fixture().await;
    let pr_first = commit_on_parent(&fx.upstream, fx.upstream_head, "feature.txt", "v1\n");
    // The ref has moved past the revision we want.
    let pr_second = commit_on_parent(&fx.upstream, pr_first, "feature.txt", "v2\n");
    fx.upstream.reference("refs/pull/10/head", pr_second, true, "pr 10").unwrap();

    let (reporter, _) = ProgressReporter::new();
    let outcome = fx
        .engine
        .merge_test_revision(
            TestMergeRequest {
                number: 10,
                target_sha: Some(pr_first.to_string()),
                comment: None,
            },
            committer(),
            None,
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, Some(true));
    assert_eq!(
        std::fs::read_to_string(fx.work_path.join("feature.txt")).unwrap(),
        "v1\n"
    );
    let _ = drain_events(&mut fx.events);
}

#[tokio::test]
async fn reset_to_origin_discards_local_commits() {
    let fx = cloned_fixture().await;
    {
        let work = Repository::open(&fx.work_path).unwrap();
        commit_file(&work, "local.txt", "local\n", "local work");
        std::fs::write(fx.work_path.join("stray.txt"), "stray").unwrap();
    }

    let (reporter, _) = ProgressReporter::new();
    fx.engine
        .reset_to_origin(None, reporter, CancellationToken::new())
        .await
        .unwrap();

    let snapshot = fx.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.head_sha, fx.upstream_head.to_string());
    assert!(!fx.work_path.join("local.txt").exists());
    assert!(!fx.work_path.join("stray.txt").exists());
}

#[tokio::test]
async fn checkout_sha_detaches_head() {
    let fx = cloned_fixture().await;
    {
        let work = Repository::open(&fx.work_path).unwrap();
        commit_file(&work, "later.txt", "later\n", "later");
    }

    fx.engine
        .checkout(fx.upstream_head.to_string(), CancellationToken::new())
        .await
        .unwrap();
    let snapshot = fx.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.head_sha, fx.upstream_head.to_string());
    assert!(!snapshot.tracking_branch);
}

#[tokio::test]
async fn fetch_origin_emits_event() {
    let mut fx = cloned_fixture().await;
    let (reporter, _) = ProgressReporter::new();
    fx.engine
        .fetch_origin(None, reporter, CancellationToken::new())
        .await
        .unwrap();
    let events = drain_events(&mut fx.events);
    assert!(matches!(events.as_slice(), [Event::RepoFetch { .. }]));
}

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let fx = cloned_fixture().await;
    let token = CancellationToken::new();
    token.cancel();
    let (reporter, _) = ProgressReporter::new();
    let err = fx
        .engine
        .fetch_origin(None, reporter, token)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));
}

#[tokio::test]
async fn synchronize_without_credentials_is_noop() {
    let fx = cloned_fixture().await;
    let pushed = fx
        .engine
        .synchronize(
            None,
            committer(),
            true,
            no_op_hook(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!pushed);
}

#[tokio::test]
async fn synchronize_veto_resets_and_returns_false() {
    let fx = cloned_fixture().await;
    let head_before = fx.engine.snapshot().await.unwrap().head_sha;
    let veto: PreSyncHook = Arc::new(|_: &StdPath| false);
    let pushed = fx
        .engine
        .synchronize(
            Some(Credentials {
                username: "user".to_string(),
                password: "token".to_string(),
            }),
            committer(),
            true,
            veto,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!pushed);
    assert_eq!(fx.engine.snapshot().await.unwrap().head_sha, head_before);
}
