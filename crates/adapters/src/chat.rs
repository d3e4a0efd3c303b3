// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat provider adapters.
//!
//! [`ChatProvider`] is the open extension point: each embedded provider
//! (IRC, Discord, ...) lives behind it. The core ships [`LogProvider`],
//! which delivers into the tracing log and is always available — useful
//! headless and in tests.

use async_trait::async_trait;
use gk_core::ChannelKind;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("provider disconnected: {0}")]
    Disconnected(String),
    #[error("channel not found: {0}")]
    UnknownChannel(String),
    #[error("provider error: {0}")]
    Provider(String),
}

/// One reachable channel as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Provider-scoped identifier (e.g. `#ops`).
    pub id: String,
    pub display_name: String,
}

/// A chat backend. Implementations must be safe to call concurrently;
/// delivery failures are reported, never panicked.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), ChatError>;

    async fn disconnect(&self);

    /// Deliver one message to one channel.
    async fn send(&self, channel: &str, message: &str) -> Result<(), ChatError>;

    /// Enumerate reachable channels, used to re-materialise channel
    /// bindings after settings changes.
    async fn channels(&self) -> Result<Vec<ChannelInfo>, ChatError>;
}

/// Provider that writes into the daemon log.
#[derive(Debug, Default)]
pub struct LogProvider;

#[async_trait]
impl ChatProvider for LogProvider {
    fn name(&self) -> &str {
        "log"
    }

    async fn connect(&self) -> Result<(), ChatError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn send(&self, channel: &str, message: &str) -> Result<(), ChatError> {
        tracing::info!(target: "gk::chat", channel, "{}", message);
        Ok(())
    }

    async fn channels(&self) -> Result<Vec<ChannelInfo>, ChatError> {
        // One synthetic channel per class so bindings always resolve.
        Ok([ChannelKind::Watchdog, ChannelKind::Dev, ChannelKind::Admin, ChannelKind::Game]
            .iter()
            .map(|kind| ChannelInfo {
                id: format!("log:{}", kind),
                display_name: kind.to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
