// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session controller: owns one running game-server process.
//!
//! A session is born by [`SessionController::launch`] (spawning a fresh
//! process) or [`SessionController::reattach`] (rebinding to a pid from a
//! persisted record). Either way it owns the bridge registration for its
//! access identifier and two monitor tasks: one watching process exit,
//! one pumping inbound bridge requests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gk_adapters::{probe_port, ProcessExecutor, SpawnSpec};
use gk_core::{
    Deployment, Error, ErrorCode, InstanceId, LaunchParameters, ReattachRecord, RebootState,
    SecurityLevel,
};

use crate::deployment::DmbProvider;
use crate::toolchain::{self, SharedLock};
use crate::watchdog::bridge::{BridgeRegistrar, BridgeRequest, TopicClient};

/// Grace given to a terminating process before SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Poll interval for reattached processes we do not own.
const REATTACH_POLL: Duration = Duration::from_secs(1);

/// Shared collaborators a session needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub instance: InstanceId,
    pub executor: ProcessExecutor,
    pub registrar: BridgeRegistrar,
    pub topic: Arc<dyn TopicClient>,
    /// Loopback port sessions call back on, carried in `-params`.
    pub bridge_port: u16,
}

/// Exit report: `None` while running, `Some(code)` after; code itself is
/// `None` when the process died to a signal or was reattached.
pub type ExitWatch = watch::Receiver<Option<Option<i32>>>;

pub struct SessionController {
    deps: SessionDeps,
    deployment: Deployment,
    dmb: DmbProvider,
    _toolchain: Option<SharedLock>,
    params: LaunchParameters,
    port: u16,
    security: SecurityLevel,
    access_identifier: String,
    pid: u32,
    primary_dir: bool,
    reboot_tx: watch::Sender<RebootState>,
    initialised_rx: watch::Receiver<bool>,
    exit_rx: ExitWatch,
    bridge_tx: broadcast::Sender<BridgeRequest>,
    monitor_token: CancellationToken,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("deployment", &self.deployment)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("access_identifier", &self.access_identifier)
            .field("pid", &self.pid)
            .field("primary_dir", &self.primary_dir)
            .finish()
    }
}

impl SessionController {
    /// Launch a fresh process from a deployment slot.
    #[allow(clippy::too_many_arguments)]
    pub fn launch(
        deps: SessionDeps,
        dmb: DmbProvider,
        toolchain_lock: SharedLock,
        params: LaunchParameters,
        port: u16,
        primary_dir: bool,
        validate: bool,
    ) -> Result<Self, Error> {
        let deployment = dmb.deployment().clone();

        // No second interactive instance of the game binary may run under
        // our OS user; the pager holds state the server needs exclusively.
        match deps.executor.find_same_user_process(toolchain::PAGER_NEEDLE) {
            Ok(Some(pid)) => {
                return Err(Error::conflict(
                    ErrorCode::DeploymentPagerRunning,
                    format!("interactive game client running as pid {}", pid),
                ));
            }
            Ok(None) => {}
            // Non-native platform: the scan does not apply.
            Err(_) => {}
        }

        if !probe_port(port) {
            return Err(Error::conflict(
                ErrorCode::DreamDaemonPortInUse,
                format!("port {} is unavailable", port),
            ));
        }

        let security = params.security_level.clamp_to(deployment.minimum_security);
        let access_identifier = generate_access_identifier();

        // Registration precedes the spawn so the handshake can never miss.
        let bridge_rx = deps.registrar.register(&access_identifier);

        let launch_dir = dmb.launch_dir(primary_dir).to_path_buf();
        let spec = SpawnSpec {
            program: toolchain::server_binary(&toolchain_lock.version_dir()),
            args: command_line(
                &deployment.artifact,
                &params,
                port,
                security,
                validate,
                deps.bridge_port,
                &access_identifier,
            ),
            cwd: launch_dir,
            env: HashMap::new(),
            log_tag: format!("{}:{}", deps.instance, port),
        };
        let mut handle = deps.executor.spawn(spec).map_err(|e| {
            deps.registrar.deregister(&access_identifier);
            Error::internal(format!("failed to launch game server: {}", e))
        })?;
        let pid = handle.pid;
        info!(instance = %deps.instance, pid, port, %security, "session launched");

        let (initialised_tx, initialised_rx) = watch::channel(false);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (reboot_tx, _) = watch::channel(RebootState::Normal);
        let (bridge_tx, _) = broadcast::channel(16);
        let monitor_token = CancellationToken::new();

        // Exit monitor: owns the child handle for wait/reap.
        let exit_token = monitor_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = exit_token.cancelled() => {}
                code = handle.wait() => {
                    let _ = exit_tx.send(Some(code.unwrap_or(None)));
                }
            }
        });

        let controller = Self {
            deps,
            deployment,
            dmb,
            _toolchain: Some(toolchain_lock),
            params,
            port,
            security,
            access_identifier,
            pid,
            primary_dir,
            reboot_tx,
            initialised_rx,
            exit_rx,
            bridge_tx,
            monitor_token,
        };
        controller.spawn_bridge_pump(bridge_rx, initialised_tx);
        Ok(controller)
    }

    /// Rebind to a process recorded before a controller restart. The
    /// caller has already verified the pid is alive.
    pub fn reattach(
        deps: SessionDeps,
        record: &ReattachRecord,
        dmb: DmbProvider,
        toolchain_lock: Option<SharedLock>,
        params: LaunchParameters,
    ) -> Self {
        let deployment = dmb.deployment().clone();
        let bridge_rx = deps.registrar.register(&record.access_identifier);

        // A reattached session already completed its handshake.
        let (initialised_tx, initialised_rx) = watch::channel(true);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (reboot_tx, _) = watch::channel(record.reboot_state);
        let (bridge_tx, _) = broadcast::channel(16);
        let monitor_token = CancellationToken::new();

        // We do not own the process; liveness is polled by pid.
        let executor = deps.executor.clone();
        let pid = record.pid;
        let poll_token = monitor_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = poll_token.cancelled() => return,
                    _ = tokio::time::sleep(REATTACH_POLL) => {
                        if !executor.pid_alive(pid) {
                            let _ = exit_tx.send(Some(None));
                            return;
                        }
                    }
                }
            }
        });

        info!(instance = %deps.instance, pid, port = record.port, "session reattached");
        let controller = Self {
            deps,
            deployment,
            dmb,
            _toolchain: toolchain_lock,
            params,
            port: record.port,
            security: record.security_level,
            access_identifier: record.access_identifier.clone(),
            pid,
            primary_dir: record.primary_dir,
            reboot_tx,
            initialised_rx,
            exit_rx,
            bridge_tx,
            monitor_token,
        };
        controller.spawn_bridge_pump(bridge_rx, initialised_tx);
        controller
    }

    fn spawn_bridge_pump(
        &self,
        mut bridge_rx: tokio::sync::mpsc::UnboundedReceiver<BridgeRequest>,
        initialised_tx: watch::Sender<bool>,
    ) {
        let rebroadcast = self.bridge_tx.clone();
        let token = self.monitor_token.clone();
        let instance = self.deps.instance.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    request = bridge_rx.recv() => {
                        let Some(request) = request else { return };
                        debug!(instance = %instance, ?request, "bridge request");
                        if request == BridgeRequest::Startup {
                            let _ = initialised_tx.send(true);
                        }
                        let _ = rebroadcast.send(request);
                    }
                }
            }
        });
    }

    /// Terminate the process. Graceful termination asks the server to
    /// shut down over the topic first, then escalates.
    pub async fn terminate(&self, graceful: bool) {
        self.deps.registrar.deregister(&self.access_identifier);
        if self.running() {
            if graceful {
                let _ = self
                    .send_topic(r#"{"command":"shutdown"}"#)
                    .await
                    .map_err(|e| debug!(error = %e, "shutdown topic failed"));
                self.deps.executor.terminate(self.pid, TERMINATE_GRACE).await;
            } else {
                self.deps.executor.terminate(self.pid, Duration::from_millis(100)).await;
            }
        }
        // Wait for the exit monitor to observe the death.
        let mut exit = self.exit_rx.clone();
        let observed = tokio::time::timeout(TERMINATE_GRACE, async {
            while exit.borrow().is_none() {
                if exit.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if observed.is_err() {
            warn!(pid = self.pid, "process did not exit within grace");
        }
        self.monitor_token.cancel();
    }

    /// Controller-shutdown handoff: stop supervising without touching
    /// the process. The bridge registration unwinds when the controller
    /// is dropped; the process keeps running for the next controller to
    /// reattach.
    pub(crate) fn release(&self) {
        self.monitor_token.cancel();
    }

    /// One topic exchange with the running server.
    pub async fn send_topic(&self, payload: &str) -> Result<String, Error> {
        let timeout = Duration::from_secs(self.params.topic_timeout_secs.max(1));
        self.deps.topic.send(self.port, payload, timeout).await
    }

    pub fn set_reboot_state(&self, state: RebootState) {
        let _ = self.reboot_tx.send(state);
    }

    pub fn reboot_state(&self) -> RebootState {
        *self.reboot_tx.borrow()
    }

    pub fn running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    pub fn initialised(&self) -> watch::Receiver<bool> {
        self.initialised_rx.clone()
    }

    pub fn exited(&self) -> ExitWatch {
        self.exit_rx.clone()
    }

    pub fn bridge_events(&self) -> broadcast::Receiver<BridgeRequest> {
        self.bridge_tx.subscribe()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn launch_parameters(&self) -> &LaunchParameters {
        &self.params
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn access_identifier(&self) -> &str {
        &self.access_identifier
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn primary_dir(&self) -> bool {
        self.primary_dir
    }

    pub fn launch_dir(&self) -> PathBuf {
        self.dmb.launch_dir(self.primary_dir).to_path_buf()
    }

    /// Record that lets a future controller process rebind to us.
    pub fn reattach_record(&self) -> ReattachRecord {
        ReattachRecord {
            instance: self.deps.instance.clone(),
            pid: self.pid,
            access_identifier: self.access_identifier.clone(),
            port: self.port,
            primary_dir: self.primary_dir,
            deployment: self.deployment.id.clone(),
            reboot_state: self.reboot_state(),
            security_level: self.security,
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.deps.registrar.deregister(&self.access_identifier);
        self.monitor_token.cancel();
    }
}

/// ≥128 bits of entropy, hex encoded.
fn generate_access_identifier() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compose the game-server command line.
///
/// `<artifact> -port <P> -ports 1-65535 [-webclient] -close -<security>
/// -<visibility> -params "<urlencoded>"`
fn command_line(
    artifact: &str,
    params: &LaunchParameters,
    port: u16,
    security: SecurityLevel,
    validate: bool,
    bridge_port: u16,
    access_identifier: &str,
) -> Vec<String> {
    let mut args = vec![
        artifact.to_string(),
        "-port".to_string(),
        port.to_string(),
        "-ports".to_string(),
        "1-65535".to_string(),
    ];
    if params.allow_web_client {
        args.push("-webclient".to_string());
    }
    args.push("-close".to_string());
    args.push(format!("-{}", security.command_word()));
    args.push(if validate { "-invisible".to_string() } else { "-public".to_string() });
    args.push("-params".to_string());
    args.push(format!(
        "api_version={}&bridge_port={}&access_identifier={}",
        urlencoding::encode(gk_wire::API_VERSION),
        bridge_port,
        urlencoding::encode(access_identifier),
    ));
    args
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
