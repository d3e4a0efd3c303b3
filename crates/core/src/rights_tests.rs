// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn contains_requires_all_bits() {
    let held = instance::RENAME | instance::RELOCATE;
    assert!(held.contains(instance::RENAME));
    assert!(held.contains(instance::RENAME | instance::RELOCATE));
    assert!(!held.contains(instance::SET_ONLINE));
    assert!(!held.contains(instance::RENAME | instance::SET_ONLINE));
}

#[test]
fn none_contains_nothing_but_none() {
    assert!(Rights::NONE.contains(Rights::NONE));
    assert!(!Rights::NONE.contains(instance::RENAME));
}

#[test]
fn all_contains_everything() {
    assert!(Rights::ALL.contains(watchdog::START | watchdog::STOP));
    assert!(Rights::ALL.contains(repository::MERGE));
}

#[test]
fn full_rights_cover_every_type() {
    let full = InstanceUserRights::full();
    assert!(full.for_type(RightsType::Instance).contains(instance::GRANT_RIGHTS));
    assert!(full.for_type(RightsType::Repository).contains(repository::CANCEL_JOBS));
    assert!(full.for_type(RightsType::Watchdog).contains(watchdog::RESTART));
}

#[test]
fn default_rights_are_empty() {
    let none = InstanceUserRights::default();
    assert_eq!(none.for_type(RightsType::Deployment), Rights::NONE);
}

#[test]
fn rights_serde_is_transparent() {
    let json = serde_json::to_string(&instance::SET_ONLINE).unwrap();
    assert_eq!(json, "4");
    let parsed: Rights = serde_json::from_str("7").unwrap();
    assert!(parsed.contains(instance::RENAME | instance::RELOCATE | instance::SET_ONLINE));
}
