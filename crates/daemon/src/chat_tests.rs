// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use async_trait::async_trait;
use gk_adapters::chat::ChatError;
use std::sync::atomic::{AtomicUsize, Ordering};

fn settings(channels: &[(&str, &str)]) -> ChatSettings {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (class, id) in channels {
        map.entry(class.to_string()).or_default().push(id.to_string());
    }
    ChatSettings {
        name: "ops".to_string(),
        provider: "log".to_string(),
        enabled: true,
        channels: map,
    }
}

fn ins() -> InstanceId {
    InstanceId::from("ins-chat")
}

#[tokio::test]
async fn reload_materialises_providers_and_channels() {
    let bridge = ChatBridge::new(ins());
    bridge.reload(&[settings(&[("watchdog", "log:watchdog")])]).await;
    let channels = bridge.known_channels();
    assert!(channels.iter().any(|c| c.id == "log:watchdog"));
}

#[tokio::test]
async fn disabled_and_unknown_providers_are_skipped() {
    let bridge = ChatBridge::new(ins());
    let mut disabled = settings(&[("dev", "log:dev")]);
    disabled.enabled = false;
    let unknown = ChatSettings {
        name: "mystery".to_string(),
        provider: "telepathy".to_string(),
        enabled: true,
        channels: HashMap::new(),
    };
    bridge.reload(&[disabled, unknown]).await;
    assert!(bridge.known_channels().is_empty());
}

#[tokio::test]
async fn deliver_routes_by_channel_class() {
    let bridge = ChatBridge::new(ins());
    bridge.reload(&[settings(&[("watchdog", "log:watchdog")])]).await;
    // Watchdog event has a binding; dev event does not. Both must not
    // error.
    bridge
        .deliver(&Event::WatchdogLaunched { instance: ins(), port: 1337 })
        .await;
    bridge.deliver(&Event::RepoFetch { instance: ins() }).await;
}

#[tokio::test]
async fn custom_commands_come_from_the_deployment_manifest() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("chat_commands.json"),
        r#"[{"name": "who", "help_text": "List players"}]"#,
    )
    .unwrap();

    let bridge = ChatBridge::new(ins());
    bridge.load_custom_commands(dir.path()).await;
    let commands = bridge.custom_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].name, "who");

    // A deployment without a manifest clears the list.
    let empty = tempfile::tempdir().unwrap();
    bridge.load_custom_commands(empty.path()).await;
    assert!(bridge.custom_commands().is_empty());
}

/// Provider that fails a fixed number of times before succeeding.
struct FlakyProvider {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

#[async_trait]
impl gk_adapters::ChatProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn connect(&self) -> Result<(), ChatError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn send(&self, _channel: &str, _message: &str) -> Result<(), ChatError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(ChatError::Provider("flaked".to_string()));
        }
        Ok(())
    }

    async fn channels(&self) -> Result<Vec<ChannelInfo>, ChatError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn delivery_retries_with_backoff_then_succeeds() {
    let provider = FlakyProvider {
        failures_left: AtomicUsize::new(2),
        attempts: AtomicUsize::new(0),
    };
    send_with_retry(&provider, "#ops", "hello").await;
    assert_eq!(provider.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn delivery_gives_up_after_bounded_attempts() {
    let provider = FlakyProvider {
        failures_left: AtomicUsize::new(100),
        attempts: AtomicUsize::new(0),
    };
    send_with_retry(&provider, "#ops", "hello").await;
    assert_eq!(
        provider.attempts.load(Ordering::SeqCst),
        DELIVERY_ATTEMPTS as usize
    );
}

#[test]
fn channel_classes_parse() {
    assert_eq!(parse_channel_kind("watchdog"), Some(ChannelKind::Watchdog));
    assert_eq!(parse_channel_kind("dev"), Some(ChannelKind::Dev));
    assert_eq!(parse_channel_kind("admin"), Some(ChannelKind::Admin));
    assert_eq!(parse_channel_kind("game"), Some(ChannelKind::Game));
    assert_eq!(parse_channel_kind("other"), None);
}
