// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gk_core::{Clock, ErrorCode, FakeClock, InstanceId};
use std::path::PathBuf;

#[test]
fn error_message_carries_numeric_code() {
    let err = Error::conflict(ErrorCode::InstanceDetachOnline, "instance is online");
    let body = ErrorMessage::from(&err);
    assert_eq!(body.error_code, Some(13));
    let json = serde_json::to_string(&body).unwrap();
    assert!(json.contains("\"error_code\":13"));
}

#[test]
fn plain_error_omits_code_field() {
    let err = Error::gone("instance detached");
    let json = serde_json::to_string(&ErrorMessage::from(&err)).unwrap();
    assert!(!json.contains("error_code"));
}

#[test]
fn job_response_reflects_outcomes() {
    let clock = FakeClock::new();
    let mut job = Job::new(
        Some(InstanceId::from("ins-test")),
        "Fetch origin",
        "admin",
        None,
        &clock,
    );
    let response = JobResponse::from(&job);
    assert!(!response.cancelled);
    assert_eq!(response.error, None);
    assert_eq!(response.stopped_at_ms, None);

    job.finish(JobOutcome::Cancelled, clock.epoch_ms());
    let response = JobResponse::from(&job);
    assert!(response.cancelled);

    let mut job = Job::new(None, "Clean cache", "system", None, &clock);
    job.finish(
        JobOutcome::Errored {
            code: Some(ErrorCode::DreamDaemonPortInUse),
            message: "port busy".to_string(),
        },
        clock.epoch_ms(),
    );
    let response = JobResponse::from(&job);
    assert_eq!(response.error.unwrap().error_code, Some(20));
}

#[test]
fn instance_user_response_exposes_raw_masks() {
    let rights = gk_core::InstanceUserRights::full();
    let body = InstanceUserResponse::from_rights("admin", &rights);
    assert_eq!(body.user, "admin");
    assert_eq!(body.instance_rights, u64::MAX);
    assert_eq!(body.repository_rights, u64::MAX);
}

#[test]
fn instance_response_marks_attach() {
    let instance = Instance::new("prod", PathBuf::from("/srv/instances/prod"));
    let created = InstanceResponse::from_instance(&instance, Some(false));
    assert_eq!(created.attached, Some(false));

    let read = InstanceResponse::from_instance(&instance, None);
    assert!(!serde_json::to_string(&read).unwrap().contains("attached"));
}
