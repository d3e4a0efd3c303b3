// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for session and watchdog tests: a fake game-server
//! binary, an auto-handshaking bridge poller, and a scriptable topic
//! client.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gk_core::{
    Deployment, DeploymentId, Error, InstanceId, RevisionInformation, SecurityLevel,
};

use crate::deployment::DeploymentStore;
use crate::toolchain::{self, ToolchainManager};
use crate::watchdog::bridge::{BridgeRegistrar, BridgeRequest, TopicClient};

pub const TEST_TOOLCHAIN: &str = "1.0";

/// Install a fake toolchain whose server binary is a shell script that
/// sleeps for `run_secs` seconds.
pub fn install_fake_toolchain(toolchain_root: &Path, run_secs: f32) {
    let version_dir = toolchain_root.join(TEST_TOOLCHAIN);
    let binary = toolchain::server_binary(&version_dir);
    std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
    std::fs::write(&binary, format!("#!/bin/sh\nsleep {}\n", run_secs)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// Commit a deployment whose staging dirs exist and contain the artifact.
pub async fn commit_fake_deployment(store: &DeploymentStore, epoch_ms: u64) -> Deployment {
    let deployment = Deployment {
        id: DeploymentId::generate(),
        revision: RevisionInformation {
            sha: "a".repeat(40),
            origin_sha: "a".repeat(40),
            active_test_merges: Vec::new(),
        },
        minimum_security: SecurityLevel::Ultrasafe,
        toolchain_version: TEST_TOOLCHAIN.to_string(),
        artifact: "game.dmb".to_string(),
        created_at_ms: epoch_ms,
    };
    let dirs = store.stage(&deployment.id).await.unwrap();
    std::fs::write(dirs.primary.join("game.dmb"), b"artifact").unwrap();
    std::fs::write(dirs.secondary.join("game.dmb"), b"artifact").unwrap();
    store.commit(deployment.clone());
    deployment
}

/// Fake toolchain manager rooted in a temp dir, version pre-installed.
pub fn fake_toolchain(toolchain_root: &Path, run_secs: f32) -> ToolchainManager {
    install_fake_toolchain(toolchain_root, run_secs);
    ToolchainManager::new(
        toolchain_root.to_path_buf(),
        Arc::new(crate::toolchain::CacheOnlyInstaller),
    )
}

/// Background task that answers every registered access identifier with
/// the startup handshake, standing in for the game server's bridge call.
pub fn spawn_handshaker(registrar: BridgeRegistrar) -> CancellationToken {
    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        loop {
            if stop.is_cancelled() {
                return;
            }
            for id in registrar.identifiers() {
                let _ = registrar.dispatch(&id, BridgeRequest::Startup);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    });
    token
}

/// Topic client whose failures are scriptable.
#[derive(Default)]
pub struct FakeTopicClient {
    pub fail: AtomicBool,
    pub sent: AtomicUsize,
}

#[async_trait]
impl TopicClient for FakeTopicClient {
    async fn send(&self, _port: u16, _payload: &str, _timeout: Duration) -> Result<String, Error> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(Error::new(gk_core::ErrorKind::Transient, "topic down"))
        } else {
            Ok("ok".to_string())
        }
    }
}

pub fn test_instance_id() -> InstanceId {
    InstanceId::from("ins-watchdog-test")
}
