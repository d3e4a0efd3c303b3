// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launch parameters and session-facing value types.

use crate::error::{Error, ErrorCode};
use serde::{Deserialize, Serialize};

/// Sandbox level the game server runs at.
///
/// Ordered: `Ultrasafe < Safe < Trusted`. The effective level at launch is
/// `max(configured, deployment.minimum)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Ultrasafe,
    Safe,
    Trusted,
}

impl SecurityLevel {
    /// The word passed on the game-server command line (`-ultrasafe` etc.).
    pub fn command_word(self) -> &'static str {
        match self {
            SecurityLevel::Ultrasafe => "ultrasafe",
            SecurityLevel::Safe => "safe",
            SecurityLevel::Trusted => "trusted",
        }
    }

    /// Clamp a configured level against a deployment minimum.
    pub fn clamp_to(self, minimum: SecurityLevel) -> SecurityLevel {
        self.max(minimum)
    }
}

crate::simple_display! {
    SecurityLevel {
        Ultrasafe => "ultrasafe",
        Safe => "safe",
        Trusted => "trusted",
    }
}

/// What a session should do at its next natural reboot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RebootState {
    #[default]
    Normal,
    Restart,
    Shutdown,
}

crate::simple_display! {
    RebootState {
        Normal => "normal",
        Restart => "restart",
        Shutdown => "shutdown",
    }
}

/// Parameters for launching a game-server session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchParameters {
    pub allow_web_client: bool,
    pub security_level: SecurityLevel,
    pub primary_port: u16,
    pub secondary_port: u16,
    pub startup_timeout_secs: u64,
    /// 0 disables the heartbeat monitor.
    pub heartbeat_secs: u64,
    /// Applied symmetrically to topic send and receive.
    pub topic_timeout_secs: u64,
}

impl Default for LaunchParameters {
    fn default() -> Self {
        Self {
            allow_web_client: false,
            security_level: SecurityLevel::Safe,
            primary_port: 1337,
            secondary_port: 1338,
            startup_timeout_secs: 60,
            heartbeat_secs: 60,
            topic_timeout_secs: 5,
        }
    }
}

impl LaunchParameters {
    /// Validate at settings write time. Ports must be non-zero (u16 caps
    /// the upper bound) and distinct.
    pub fn validate(&self) -> Result<(), Error> {
        if self.primary_port == 0 || self.secondary_port == 0 {
            return Err(Error::validation(
                ErrorCode::DreamDaemonInvalidPort,
                "ports must be in [1, 65535]",
            ));
        }
        if self.primary_port == self.secondary_port {
            return Err(Error::validation(
                ErrorCode::DreamDaemonDuplicatePorts,
                format!("primary and secondary port are both {}", self.primary_port),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
