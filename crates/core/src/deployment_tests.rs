// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn test_deployment() -> Deployment {
    Deployment {
        id: DeploymentId::generate(),
        revision: RevisionInformation {
            sha: "aaaa111122223333444455556666777788889999".to_string(),
            origin_sha: "aaaa111122223333444455556666777788889999".to_string(),
            active_test_merges: vec![TestMerge {
                number: 42,
                target_sha: None,
                comment: Some("fix lighting".to_string()),
                merged_by: "dev".to_string(),
                merged_at_ms: 1_700_000_000_000,
            }],
        },
        minimum_security: SecurityLevel::Safe,
        toolchain_version: "515.1633".to_string(),
        artifact: "station.dmb".to_string(),
        created_at_ms: 1_700_000_000_000,
    }
}

#[test]
fn deployment_ids_are_prefixed() {
    assert!(DeploymentId::generate().as_str().starts_with("dep-"));
}

#[test]
fn deployment_serde_round_trip() {
    let dep = test_deployment();
    let json = serde_json::to_string(&dep).unwrap();
    let parsed: Deployment = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, dep);
}

#[test]
fn test_merge_without_target_sha_omits_field() {
    let dep = test_deployment();
    let json = serde_json::to_string(&dep.revision.active_test_merges[0]).unwrap();
    assert!(!json.contains("target_sha"));
}
