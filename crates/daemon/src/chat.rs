// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The chat bridge: fans instance events out to provider channels.
//!
//! One bridge per instance. Providers are isolated — a failing provider
//! never blocks delivery to the others, and each delivery retries with
//! bounded backoff. Custom commands are sourced from the active
//! deployment's artifact manifest.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gk_adapters::chat::ChannelInfo;
use gk_adapters::{ChatProvider, LogProvider};
use gk_core::instance::ChatSettings;
use gk_core::{ChannelKind, Event, InstanceId};

/// Delivery attempts per provider before giving up on a message.
const DELIVERY_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; doubles each retry.
const DELIVERY_BACKOFF: Duration = Duration::from_millis(250);

/// A chat command exported by the running deployment, declared in a
/// `chat_commands.json` manifest beside the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub name: String,
    pub help_text: String,
}

/// Build the adapter for one settings entry. `log` is always available;
/// unknown providers are skipped with a warning.
pub fn build_provider(settings: &ChatSettings) -> Option<Arc<dyn ChatProvider>> {
    match settings.provider.as_str() {
        "log" => Some(Arc::new(LogProvider)),
        other => {
            warn!(provider = other, "unknown chat provider, skipping");
            None
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn ChatProvider>,
    /// channel class → provider channel ids.
    bindings: HashMap<ChannelKind, Vec<String>>,
    /// Channels the provider last reported; re-materialised on reload.
    known_channels: Vec<ChannelInfo>,
}

/// Per-instance chat event fan-out.
pub struct ChatBridge {
    instance: InstanceId,
    slots: Arc<Mutex<Vec<ProviderSlot>>>,
    custom_commands: Arc<Mutex<Vec<CustomCommand>>>,
}

impl ChatBridge {
    pub fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            slots: Arc::new(Mutex::new(Vec::new())),
            custom_commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Re-materialise provider adapters and their channel lists from
    /// settings. Called at instance start and on every settings change.
    pub async fn reload(&self, settings: &[ChatSettings]) {
        let mut slots = Vec::new();
        for entry in settings.iter().filter(|s| s.enabled) {
            let Some(provider) = build_provider(entry) else {
                continue;
            };
            if let Err(e) = provider.connect().await {
                warn!(
                    instance = %self.instance,
                    provider = %entry.provider,
                    error = %e,
                    "chat provider connect failed; will retry on next reload"
                );
                continue;
            }
            let known_channels = provider.channels().await.unwrap_or_default();
            let mut bindings: HashMap<ChannelKind, Vec<String>> = HashMap::new();
            for (class, ids) in &entry.channels {
                let Some(kind) = parse_channel_kind(class) else {
                    warn!(%class, "unknown channel class in chat settings");
                    continue;
                };
                bindings.entry(kind).or_default().extend(ids.iter().cloned());
            }
            slots.push(ProviderSlot { provider, bindings, known_channels });
        }
        info!(instance = %self.instance, providers = slots.len(), "chat bridge reloaded");
        *self.slots.lock() = slots;
    }

    /// Channels currently known across providers.
    pub fn known_channels(&self) -> Vec<ChannelInfo> {
        self.slots
            .lock()
            .iter()
            .flat_map(|s| s.known_channels.iter().cloned())
            .collect()
    }

    /// Replace the custom command list from a deployment directory.
    pub async fn load_custom_commands(&self, deployment_dir: &Path) {
        let manifest = deployment_dir.join("chat_commands.json");
        let commands = match tokio::fs::read_to_string(&manifest).await {
            Ok(contents) => match serde_json::from_str::<Vec<CustomCommand>>(&contents) {
                Ok(commands) => commands,
                Err(e) => {
                    warn!(instance = %self.instance, error = %e, "bad chat command manifest");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        debug!(instance = %self.instance, count = commands.len(), "custom commands loaded");
        *self.custom_commands.lock() = commands;
    }

    pub fn custom_commands(&self) -> Vec<CustomCommand> {
        self.custom_commands.lock().clone()
    }

    /// Deliver one event to every bound channel of every provider.
    pub async fn deliver(&self, event: &Event) {
        let kind = event.channel();
        let message = event.message();
        let targets: Vec<(Arc<dyn ChatProvider>, Vec<String>)> = {
            let slots = self.slots.lock();
            slots
                .iter()
                .filter_map(|slot| {
                    let channels = slot.bindings.get(&kind)?.clone();
                    (!channels.is_empty()).then(|| (slot.provider.clone(), channels))
                })
                .collect()
        };

        for (provider, channels) in targets {
            for channel in channels {
                send_with_retry(provider.as_ref(), &channel, &message).await;
            }
        }
    }

    /// Run the delivery loop until the token fires.
    pub async fn run(&self, mut events: broadcast::Receiver<Event>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => self.deliver(&event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(instance = %self.instance, missed, "chat bridge lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }
}

async fn send_with_retry(provider: &dyn ChatProvider, channel: &str, message: &str) {
    let mut backoff = DELIVERY_BACKOFF;
    for attempt in 1..=DELIVERY_ATTEMPTS {
        match provider.send(channel, message).await {
            Ok(()) => return,
            Err(e) if attempt == DELIVERY_ATTEMPTS => {
                warn!(
                    provider = provider.name(),
                    channel,
                    error = %e,
                    "chat delivery failed; giving up"
                );
            }
            Err(e) => {
                debug!(
                    provider = provider.name(),
                    channel,
                    attempt,
                    error = %e,
                    "chat delivery failed; retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

fn parse_channel_kind(class: &str) -> Option<ChannelKind> {
    match class {
        "watchdog" => Some(ChannelKind::Watchdog),
        "dev" => Some(ChannelKind::Dev),
        "admin" => Some(ChannelKind::Admin),
        "game" => Some(ChannelKind::Game),
        _ => None,
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
