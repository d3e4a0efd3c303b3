// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance rights: bitmasks grouped by subsystem.
//!
//! A caller's capability on an instance is a set of [`Rights`] masks, one
//! per [`RightsType`]. Operations name the single bit they demand; jobs
//! record the (type, bit) pair a canceller must hold.

use serde::{Deserialize, Serialize};

/// Subsystems that carry an independent rights bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightsType {
    Instance,
    Repository,
    Watchdog,
    Deployment,
    Chat,
    Configuration,
    Toolchain,
}

crate::simple_display! {
    RightsType {
        Instance => "instance",
        Repository => "repository",
        Watchdog => "watchdog",
        Deployment => "deployment",
        Chat => "chat",
        Configuration => "configuration",
        Toolchain => "toolchain",
    }
}

/// A bitmask of rights within one [`RightsType`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rights(pub u64);

impl Rights {
    pub const NONE: Rights = Rights(0);
    pub const ALL: Rights = Rights(u64::MAX);

    pub fn contains(self, required: Rights) -> bool {
        self.0 & required.0 == required.0
    }

    pub fn union(self, other: Rights) -> Rights {
        Rights(self.0 | other.0)
    }
}

impl std::ops::BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        self.union(rhs)
    }
}

/// Instance-level right bits.
pub mod instance {
    use super::Rights;

    pub const RENAME: Rights = Rights(1 << 0);
    pub const RELOCATE: Rights = Rights(1 << 1);
    pub const SET_ONLINE: Rights = Rights(1 << 2);
    pub const SET_CONFIG: Rights = Rights(1 << 3);
    pub const SET_AUTO_UPDATE: Rights = Rights(1 << 4);
    pub const SET_CHAT_SETTINGS: Rights = Rights(1 << 5);
    pub const GRANT_RIGHTS: Rights = Rights(1 << 6);
}

/// Repository right bits.
pub mod repository {
    use super::Rights;

    pub const CLONE: Rights = Rights(1 << 0);
    pub const FETCH: Rights = Rights(1 << 1);
    pub const CHECKOUT: Rights = Rights(1 << 2);
    pub const MERGE: Rights = Rights(1 << 3);
    pub const SYNCHRONIZE: Rights = Rights(1 << 4);
    pub const CANCEL_JOBS: Rights = Rights(1 << 5);
}

/// Watchdog right bits.
pub mod watchdog {
    use super::Rights;

    pub const START: Rights = Rights(1 << 0);
    pub const STOP: Rights = Rights(1 << 1);
    pub const RESTART: Rights = Rights(1 << 2);
    pub const SET_PARAMETERS: Rights = Rights(1 << 3);
    pub const CANCEL_JOBS: Rights = Rights(1 << 4);
}

/// Deployment right bits.
pub mod deployment {
    use super::Rights;

    pub const COMPILE: Rights = Rights(1 << 0);
    pub const CANCEL_JOBS: Rights = Rights(1 << 1);
}

/// The full rights a single user holds on a single instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceUserRights {
    pub instance: Rights,
    pub repository: Rights,
    pub watchdog: Rights,
    pub deployment: Rights,
    pub chat: Rights,
    pub configuration: Rights,
    pub toolchain: Rights,
}

impl InstanceUserRights {
    /// Every bit in every subsystem, granted to instance creators.
    pub fn full() -> Self {
        Self {
            instance: Rights::ALL,
            repository: Rights::ALL,
            watchdog: Rights::ALL,
            deployment: Rights::ALL,
            chat: Rights::ALL,
            configuration: Rights::ALL,
            toolchain: Rights::ALL,
        }
    }

    /// The mask held for one subsystem.
    pub fn for_type(&self, rights_type: RightsType) -> Rights {
        match rights_type {
            RightsType::Instance => self.instance,
            RightsType::Repository => self.repository,
            RightsType::Watchdog => self.watchdog,
            RightsType::Deployment => self.deployment,
            RightsType::Chat => self.chat,
            RightsType::Configuration => self.configuration,
            RightsType::Toolchain => self.toolchain,
        }
    }
}

#[cfg(test)]
#[path = "rights_tests.rs"]
mod tests;
