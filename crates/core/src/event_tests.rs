// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ins() -> InstanceId {
    InstanceId::from("ins-test")
}

#[test]
fn repo_events_go_to_dev_channels() {
    assert_eq!(Event::RepoFetch { instance: ins() }.channel(), ChannelKind::Dev);
    assert_eq!(
        Event::DeployFailed { instance: ins(), error: "bad dm".to_string() }.channel(),
        ChannelKind::Dev
    );
}

#[test]
fn watchdog_events_go_to_watchdog_channels() {
    let event = Event::WatchdogCrashed { instance: ins(), relaunching: true };
    assert_eq!(event.channel(), ChannelKind::Watchdog);
    assert!(event.message().contains("relaunching"));
}

#[test]
fn online_toggles_go_to_admin_channels() {
    assert_eq!(Event::InstanceOnline { instance: ins() }.channel(), ChannelKind::Admin);
}

#[test]
fn every_event_names_its_instance() {
    let event = Event::WatchdogLaunched { instance: ins(), port: 1337 };
    assert_eq!(event.instance(), &ins());
}

#[test]
fn merge_message_shortens_sha() {
    let event = Event::RepoMergePullRequest {
        instance: ins(),
        number: 7,
        sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
        fast_forward: false,
    };
    let msg = event.message();
    assert!(msg.contains("#7"));
    assert!(msg.contains("01234567"));
    assert!(!msg.contains("89abcdef0123456789"));
}
