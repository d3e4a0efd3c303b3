// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! One JSON file with sections `general`, `file_logging`, `control_panel`,
//! and `database`. The last two are opaque here: they belong to the
//! external HTTP adapter and database layer, and are stored verbatim so
//! one file configures the whole deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub file_logging: FileLoggingConfig,
    /// Passed through to the control-panel host; not interpreted.
    pub control_panel: serde_json::Value,
    /// Passed through to the database layer; not interpreted.
    pub database: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory the daemon itself is installed in. No instance may live
    /// underneath it (or contain it).
    pub install_dir: PathBuf,
    /// Root for daemon state (persisted records, logs).
    pub state_dir: PathBuf,
    /// When non-empty, new instance paths must fall under one of these.
    pub valid_instance_paths: Vec<PathBuf>,
    /// Loopback port the bridge listener binds; handed to sessions in
    /// their launch parameter string.
    pub bridge_port: u16,
    /// Toolchain versions never evicted by the cache cleaner.
    pub pinned_toolchain_versions: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("/opt/gamekeeper"),
            state_dir: PathBuf::from("/var/lib/gamekeeper"),
            valid_instance_paths: Vec::new(),
            bridge_port: 5580,
            pinned_toolchain_versions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub directory: Option<PathBuf>,
    pub level: String,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self { enabled: true, directory: None, level: "info".to_string() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Where the persisted state file lives.
    pub fn state_file(&self) -> PathBuf {
        self.general.state_dir.join("state.json")
    }

    /// Where file logs go when enabled and no directory is configured.
    pub fn log_dir(&self) -> PathBuf {
        self.file_logging
            .directory
            .clone()
            .unwrap_or_else(|| self.general.state_dir.join("logs"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
