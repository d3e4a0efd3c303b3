// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy and stable error codes.
//!
//! Components raise [`Error`] values classified by [`ErrorKind`]; the
//! external HTTP layer is the single place that converts kinds to status
//! codes (see `gk-wire`). Codes are stable small integers carried in
//! conflict and validation responses so callers can branch on semantics
//! rather than message text.

use serde::{Deserialize, Serialize};

/// Stable numeric error codes carried by conflict/validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    /// Proposed instance path collides with the install directory or
    /// another instance's directory tree.
    InstanceAtConflictingPath = 10,
    /// Proposed instance path exists, is non-empty, and carries no attach
    /// sentinel.
    InstanceAtExistingPath = 11,
    /// Proposed instance path falls outside the configured whitelist.
    InstanceNotAtWhitelistedPath = 12,
    /// Detach requested while the instance is online.
    InstanceDetachOnline = 13,
    /// Relocation requested while the instance is online.
    InstanceRelocateOnline = 14,
    /// Instance name or id already in use.
    InstanceNameTaken = 15,
    /// Requested game-server port could not be bound.
    DreamDaemonPortInUse = 20,
    /// Primary and secondary ports are equal.
    DreamDaemonDuplicatePorts = 21,
    /// Port outside the valid [1, 65535] range.
    DreamDaemonInvalidPort = 22,
    /// An interactive instance of the game binary is already running
    /// under the daemon's OS user.
    DeploymentPagerRunning = 30,
    /// No deployment available to launch from.
    DeploymentMissing = 31,
    /// Job cannot be cancelled by this caller.
    JobCancelForbidden = 40,
    /// Toolchain version is locked by a running session.
    ToolchainVersionInUse = 50,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Classification of a failure, mirroring how the control surface reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller supplied bad input.
    Validation,
    /// State-dependent refusal (invariant would be violated).
    Conflict,
    /// Referent disappeared or was detached.
    Gone,
    /// Caller is not authenticated.
    Auth,
    /// Caller lacks the required right.
    Forbidden,
    /// Feature not available on this platform or build.
    NotSupported,
    /// Retriable by the caller.
    Transient,
    /// Unexpected failure; logged with full context.
    Internal,
}

crate::simple_display! {
    ErrorKind {
        Validation => "validation",
        Conflict => "conflict",
        Gone => "gone",
        Auth => "auth",
        Forbidden => "forbidden",
        NotSupported => "not_supported",
        Transient => "transient",
        Internal => "internal",
    }
}

/// A typed domain failure: kind, optional stable code, human text.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, code: None, message: message.into() }
    }

    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, code: Some(code), message: message.into() }
    }

    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Conflict, code: Some(code), message: message.into() }
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Gone, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
