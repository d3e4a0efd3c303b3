// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gk_core::{FakeClock, Instance};
use std::path::PathBuf;

#[tokio::test]
async fn mutate_persists_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let store = Store::load(path.clone()).unwrap();
    let instance = Instance::new("prod", PathBuf::from("/srv/instances/prod"));
    let id = instance.id.clone();
    store
        .mutate(|s| {
            s.instances.insert(id.to_string(), instance.clone());
        })
        .await
        .unwrap();

    let reloaded = Store::load(path).unwrap();
    let found = reloaded.with(|s| s.instance(&id).cloned()).unwrap();
    assert_eq!(found, instance);
}

#[tokio::test]
async fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::load(dir.path().join("state.json")).unwrap();
    assert!(store.with(|s| s.instances.is_empty() && s.jobs.is_empty()));
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{not json").unwrap();
    assert!(matches!(Store::load(path), Err(StorageError::Corrupt { .. })));
}

#[tokio::test]
async fn jobs_and_reattach_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = Store::load(path.clone()).unwrap();

    let clock = FakeClock::new();
    let job = gk_core::Job::new(None, "Clean cache", "system", None, &clock);
    let job_id = job.id.clone();
    store
        .mutate(|s| {
            s.jobs.insert(job_id.to_string(), job);
        })
        .await
        .unwrap();

    let reloaded = Store::load(path).unwrap();
    assert!(reloaded.with(|s| s.job(&job_id).is_some()));
}

#[test]
fn instance_by_name_lookup() {
    let state = PersistedState {
        instances: [(
            "ins-1".to_string(),
            Instance::new("prod", PathBuf::from("/srv/prod")),
        )]
        .into_iter()
        .collect(),
        ..PersistedState::default()
    };
    assert!(state.instance_by_name("prod").is_some());
    assert!(state.instance_by_name("staging").is_none());
}
