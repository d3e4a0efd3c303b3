// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The watchdog: a state machine over zero, one, or two sessions.
//!
//! ```text
//! Offline → Starting → Online → ReplacingOnline → Online
//!              ↓          ↓            ↓
//!           Offline   Terminating → Offline
//! (startup) Reattaching → Online | Offline
//! ```
//!
//! Transitions are serialised on one async lock; observers read a watch
//! channel and never see an intermediate state. Supervisor tasks carry an
//! epoch so a monitor from a replaced session can never act on its
//! successor.

pub mod bridge;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use bridge::{BridgeRegistrar, BridgeRequest, TcpTopicClient, TopicClient};
pub use session::{SessionController, SessionDeps};

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gk_core::{
    DeploymentId, Error, ErrorCode, Event, InstanceId, LaunchParameters, RebootState,
    SecurityLevel,
};

use crate::deployment::DeploymentStore;
use crate::event_bus::EventBus;
use crate::storage::Store;
use crate::toolchain::ToolchainManager;

/// Consecutive missed heartbeats counted as an unexpected exit.
pub const HEARTBEAT_MISS_LIMIT: u32 = 3;

/// Unexpected-exit relaunches before the watchdog gives up and goes
/// offline.
pub const MAX_RELAUNCHES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogStatus {
    Offline,
    Starting,
    Online,
    ReplacingOnline,
    Terminating,
    Reattaching,
}

gk_core::simple_display! {
    WatchdogStatus {
        Offline => "offline",
        Starting => "starting",
        Online => "online",
        ReplacingOnline => "replacing_online",
        Terminating => "terminating",
        Reattaching => "reattaching",
    }
}

/// Observer snapshot for the control surface.
#[derive(Debug, Clone)]
pub struct WatchdogReport {
    pub status: WatchdogStatus,
    pub running: bool,
    pub port: Option<u16>,
    pub security: Option<SecurityLevel>,
    pub reboot_state: RebootState,
    pub active_deployment: Option<DeploymentId>,
    pub staged_deployment: Option<DeploymentId>,
}

pub struct WatchdogDeps {
    pub instance: InstanceId,
    pub session: SessionDeps,
    pub deployments: DeploymentStore,
    pub toolchain: ToolchainManager,
    pub store: Arc<Store>,
    pub events: EventBus,
}

enum State {
    Offline,
    Starting,
    Online { session: Arc<SessionController>, epoch: u64 },
    ReplacingOnline { active: Arc<SessionController>, staged: Arc<SessionController> },
    Terminating,
    Reattaching,
}

impl State {
    fn status(&self) -> WatchdogStatus {
        match self {
            State::Offline => WatchdogStatus::Offline,
            State::Starting => WatchdogStatus::Starting,
            State::Online { .. } => WatchdogStatus::Online,
            State::ReplacingOnline { .. } => WatchdogStatus::ReplacingOnline,
            State::Terminating => WatchdogStatus::Terminating,
            State::Reattaching => WatchdogStatus::Reattaching,
        }
    }
}

struct WatchdogInner {
    deps: WatchdogDeps,
    state: tokio::sync::Mutex<State>,
    status_tx: watch::Sender<WatchdogStatus>,
    epoch: AtomicU64,
    relaunches: AtomicU32,
    /// Primary/secondary designation swaps after each zero-downtime
    /// replace; the next launch then uses the other port and staging dir.
    swapped: AtomicBool,
}

#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<WatchdogInner>,
}

impl Watchdog {
    pub fn new(deps: WatchdogDeps) -> Self {
        let (status_tx, _) = watch::channel(WatchdogStatus::Offline);
        Self {
            inner: Arc::new(WatchdogInner {
                deps,
                state: tokio::sync::Mutex::new(State::Offline),
                status_tx,
                epoch: AtomicU64::new(0),
                relaunches: AtomicU32::new(0),
                swapped: AtomicBool::new(false),
            }),
        }
    }

    pub fn status(&self) -> WatchdogStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<WatchdogStatus> {
        self.inner.status_tx.subscribe()
    }

    pub async fn report(&self) -> WatchdogReport {
        // A transition in flight holds the state lock; observers get the
        // transitional status rather than blocking on it.
        let Ok(state) = self.inner.state.try_lock() else {
            return WatchdogReport {
                status: self.status(),
                running: false,
                port: None,
                security: None,
                reboot_state: RebootState::Normal,
                active_deployment: None,
                staged_deployment: None,
            };
        };
        let (running, port, security, reboot_state, active, staged) = match &*state {
            State::Online { session, .. } => (
                session.running(),
                Some(session.port()),
                Some(session.security_level()),
                session.reboot_state(),
                Some(session.deployment().id.clone()),
                None,
            ),
            State::ReplacingOnline { active, staged } => (
                active.running(),
                Some(active.port()),
                Some(active.security_level()),
                active.reboot_state(),
                Some(active.deployment().id.clone()),
                Some(staged.deployment().id.clone()),
            ),
            _ => (false, None, None, RebootState::Normal, None, None),
        };
        WatchdogReport {
            status: state.status(),
            running,
            port,
            security,
            reboot_state,
            active_deployment: active,
            staged_deployment: staged,
        }
    }

    /// `Offline → Starting → Online`. Reserves the latest deployment,
    /// launches a session, and waits for the bridge handshake within the
    /// startup timeout.
    pub async fn start(
        &self,
        params: LaunchParameters,
        validate: bool,
        token: &CancellationToken,
    ) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        if !matches!(*state, State::Offline) {
            return Err(Error::new(
                gk_core::ErrorKind::Conflict,
                format!("watchdog is {}", state.status()),
            ));
        }
        self.transition(&mut state, State::Starting);

        match self.launch_session(&params, validate, token).await {
            Ok(session) => {
                let session = Arc::new(session);
                self.persist_reattach(&session).await;
                self.inner.relaunches.store(0, Ordering::SeqCst);
                let epoch = self.next_epoch();
                self.spawn_supervisor(session.clone(), params, epoch);
                self.publish(Event::WatchdogLaunched {
                    instance: self.instance().clone(),
                    port: session.port(),
                });
                self.transition(&mut state, State::Online { session, epoch });
                Ok(())
            }
            Err(e) => {
                self.transition(&mut state, State::Offline);
                Err(e)
            }
        }
    }

    /// `Online | ReplacingOnline → Terminating → Offline`.
    pub async fn stop(&self, graceful: bool) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        let old = std::mem::replace(&mut *state, State::Terminating);
        self.inner.status_tx.send_replace(WatchdogStatus::Terminating);
        match old {
            State::Online { session, .. } => {
                session.terminate(graceful).await;
            }
            State::ReplacingOnline { active, staged } => {
                staged.terminate(false).await;
                active.terminate(graceful).await;
            }
            State::Offline => {
                self.transition(&mut state, State::Offline);
                return Ok(());
            }
            other => {
                // Mid-transition stop: restore and refuse.
                let status = other.status();
                self.transition(&mut state, other);
                return Err(Error::new(
                    gk_core::ErrorKind::Conflict,
                    format!("watchdog is {}", status),
                ));
            }
        }
        self.clear_reattach().await;
        self.publish(Event::WatchdogShutdown { instance: self.instance().clone() });
        self.transition(&mut state, State::Offline);
        Ok(())
    }

    /// Zero-downtime replace: launch a second session in the staged slot
    /// from the latest deployment, hand over, and retire the original.
    pub async fn swap_to_latest(&self, token: &CancellationToken) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        let State::Online { .. } = &*state else {
            return Err(Error::new(
                gk_core::ErrorKind::Conflict,
                format!("watchdog is {}", state.status()),
            ));
        };
        let State::Online { session: active, .. } =
            std::mem::replace(&mut *state, State::Starting)
        else {
            unreachable!("matched Online above");
        };

        // The staged session gets the other port and the other staging
        // directory; designations swap when it takes over.
        let staged_params = session_params(&active);
        let staged = match self
            .launch_session_with(&staged_params, false, token, !self.swapped())
            .await
        {
            Ok(staged) => Arc::new(staged),
            Err(e) => {
                // Replace failed to even launch; the original stays live.
                let epoch = self.next_epoch();
                self.spawn_supervisor(active.clone(), staged_params, epoch);
                self.transition(&mut state, State::Online { session: active, epoch });
                return Err(e);
            }
        };
        self.transition(
            &mut state,
            State::ReplacingOnline { active: active.clone(), staged: staged.clone() },
        );

        // Ask the original to reboot gracefully, then wait it out.
        let _ = active.send_topic(r#"{"command":"reboot"}"#).await;
        active.set_reboot_state(RebootState::Shutdown);
        let grace = Duration::from_secs(staged_params.startup_timeout_secs.max(1));
        let mut exit = active.exited();
        let exited = tokio::time::timeout(grace, async {
            while exit.borrow().is_none() {
                if exit.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if exited.is_err() {
            warn!(instance = %self.instance(), "original session ignored reboot; terminating");
            active.terminate(false).await;
        }

        self.inner.swapped.fetch_xor(true, Ordering::SeqCst);
        self.persist_reattach(&staged).await;
        self.inner.relaunches.store(0, Ordering::SeqCst);
        let epoch = self.next_epoch();
        self.spawn_supervisor(staged.clone(), staged_params, epoch);
        self.publish(Event::WatchdogLaunched {
            instance: self.instance().clone(),
            port: staged.port(),
        });
        self.transition(&mut state, State::Online { session: staged, epoch });
        info!(instance = %self.instance(), "zero-downtime replace complete");
        Ok(())
    }

    /// Controller-shutdown handoff: drop supervision, leave the process
    /// running, keep the reattach record for the next controller.
    pub async fn release(&self) {
        let mut state = self.inner.state.lock().await;
        let old = std::mem::replace(&mut *state, State::Offline);
        match old {
            State::Online { session, .. } => session.release(),
            State::ReplacingOnline { active, staged } => {
                active.release();
                staged.release();
            }
            _ => {}
        }
        self.transition(&mut state, State::Offline);
    }

    /// Set the reboot state; takes effect at the session's next natural
    /// reboot.
    pub async fn soft_restart(&self) -> Result<(), Error> {
        self.set_reboot(RebootState::Restart).await
    }

    pub async fn soft_shutdown(&self) -> Result<(), Error> {
        self.set_reboot(RebootState::Shutdown).await
    }

    async fn set_reboot(&self, reboot: RebootState) -> Result<(), Error> {
        let state = self.inner.state.lock().await;
        match &*state {
            State::Online { session, .. } => {
                session.set_reboot_state(reboot);
                self.persist_reattach(session).await;
                Ok(())
            }
            _ => Err(Error::new(
                gk_core::ErrorKind::Conflict,
                format!("watchdog is {}", state.status()),
            )),
        }
    }

    /// Startup path: restore a session from the persisted reattach
    /// record. Returns whether a session was rebound.
    pub async fn reattach(&self, params: LaunchParameters) -> Result<bool, Error> {
        let mut state = self.inner.state.lock().await;
        if !matches!(*state, State::Offline) {
            return Err(Error::new(
                gk_core::ErrorKind::Conflict,
                format!("watchdog is {}", state.status()),
            ));
        }
        self.transition(&mut state, State::Reattaching);

        let record = self
            .inner
            .deps
            .store
            .with(|s| s.reattach.get(self.instance().as_str()).cloned());
        let Some(record) = record else {
            self.transition(&mut state, State::Offline);
            return Ok(false);
        };

        if !self.inner.deps.session.executor.pid_alive(record.pid) {
            info!(instance = %self.instance(), pid = record.pid, "recorded session is gone");
            self.clear_reattach().await;
            self.transition(&mut state, State::Offline);
            return Ok(false);
        }

        let dmb = match self.inner.deps.deployments.acquire(&record.deployment) {
            Ok(dmb) => dmb,
            Err(e) => {
                warn!(instance = %self.instance(), error = %e, "reattach deployment missing");
                self.clear_reattach().await;
                self.transition(&mut state, State::Offline);
                return Ok(false);
            }
        };
        let toolchain_lock = self
            .inner
            .deps
            .toolchain
            .acquire_shared(&dmb.deployment().toolchain_version)
            .ok();

        let session = Arc::new(SessionController::reattach(
            self.inner.deps.session.clone(),
            &record,
            dmb,
            toolchain_lock,
            params.clone(),
        ));
        self.inner.swapped.store(!record.primary_dir, Ordering::SeqCst);
        let epoch = self.next_epoch();
        self.spawn_supervisor(session.clone(), params, epoch);
        self.transition(&mut state, State::Online { session, epoch });
        Ok(true)
    }

    fn instance(&self) -> &InstanceId {
        &self.inner.deps.instance
    }

    fn swapped(&self) -> bool {
        self.inner.swapped.load(Ordering::SeqCst)
    }

    fn next_epoch(&self) -> u64 {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn transition(&self, state: &mut State, next: State) {
        self.inner.status_tx.send_replace(next.status());
        *state = next;
    }

    fn publish(&self, event: Event) {
        self.inner.deps.events.publish(event);
    }

    async fn launch_session(
        &self,
        params: &LaunchParameters,
        validate: bool,
        token: &CancellationToken,
    ) -> Result<SessionController, Error> {
        self.launch_session_with(params, validate, token, self.swapped()).await
    }

    /// Launch from the latest deployment into the primary (or, when
    /// `use_secondary`, the secondary) port and staging directory, then
    /// wait for the bridge handshake.
    async fn launch_session_with(
        &self,
        params: &LaunchParameters,
        validate: bool,
        token: &CancellationToken,
        use_secondary: bool,
    ) -> Result<SessionController, Error> {
        let deployment = self.inner.deps.deployments.latest().ok_or_else(|| {
            Error::conflict(ErrorCode::DeploymentMissing, "no deployment to launch")
        })?;
        let dmb = self.inner.deps.deployments.acquire(&deployment.id)?;
        let toolchain_lock = self
            .inner
            .deps
            .toolchain
            .acquire_shared(&deployment.toolchain_version)?;

        let port = if use_secondary { params.secondary_port } else { params.primary_port };
        let session = SessionController::launch(
            self.inner.deps.session.clone(),
            dmb,
            toolchain_lock,
            params.clone(),
            port,
            !use_secondary,
            validate,
        )?;

        // Initialised within startup-timeout, or the launch is aborted.
        let timeout = Duration::from_secs(params.startup_timeout_secs.max(1));
        let mut initialised = session.initialised();
        let mut exited = session.exited();
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                if *initialised.borrow() {
                    return Ok(());
                }
                if exited.borrow().is_some() {
                    return Err(Error::internal("game server exited during startup"));
                }
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(Error::new(
                            gk_core::ErrorKind::Transient,
                            "launch cancelled",
                        ));
                    }
                    changed = initialised.changed() => {
                        if changed.is_err() {
                            return Err(Error::internal("session monitor died"));
                        }
                    }
                    _ = exited.changed() => {}
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => {
                session.terminate(false).await;
                Err(e)
            }
            Err(_) => {
                session.terminate(false).await;
                Err(Error::new(
                    gk_core::ErrorKind::Transient,
                    format!("no handshake within {}s", params.startup_timeout_secs),
                ))
            }
        }
    }

    async fn persist_reattach(&self, session: &SessionController) {
        let record = session.reattach_record();
        let key = self.instance().to_string();
        let result = self
            .inner
            .deps
            .store
            .mutate(|s| {
                s.reattach.insert(key, record);
            })
            .await;
        if let Err(e) = result {
            warn!(instance = %self.instance(), error = %e, "failed to persist reattach record");
        }
    }

    async fn clear_reattach(&self) {
        let key = self.instance().to_string();
        let result = self
            .inner
            .deps
            .store
            .mutate(|s| {
                s.reattach.remove(&key);
            })
            .await;
        if let Err(e) = result {
            warn!(instance = %self.instance(), error = %e, "failed to clear reattach record");
        }
    }

    /// One supervisor per Online session: watches exit, pumps bridge
    /// reboot notifications, and runs the heartbeat.
    fn spawn_supervisor(&self, session: Arc<SessionController>, params: LaunchParameters, epoch: u64) {
        let watchdog = self.clone();
        tokio::spawn(async move {
            let mut exited = session.exited();
            let mut bridge = session.bridge_events();
            let mut misses = 0u32;
            let heartbeat = params.heartbeat_secs;
            let mut ticker = tokio::time::interval(Duration::from_secs(heartbeat.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick is immediate

            loop {
                tokio::select! {
                    changed = exited.changed() => {
                        if changed.is_err() || exited.borrow().is_some() {
                            watchdog.handle_exit(epoch).await;
                            return;
                        }
                    }
                    request = bridge.recv() => {
                        match request {
                            Ok(BridgeRequest::Reboot) => {
                                if session.reboot_state() == RebootState::Shutdown {
                                    // Honour the pending soft shutdown.
                                    let _ = watchdog.stop_if_epoch(epoch).await;
                                    return;
                                }
                                if session.reboot_state() == RebootState::Restart {
                                    session.set_reboot_state(RebootState::Normal);
                                }
                            }
                            Ok(_) => {}
                            Err(_) => return,
                        }
                    }
                    _ = ticker.tick(), if heartbeat > 0 => {
                        match session.send_topic(r#"{"command":"health"}"#).await {
                            Ok(_) => misses = 0,
                            Err(_) => {
                                misses += 1;
                                if misses >= HEARTBEAT_MISS_LIMIT {
                                    warn!(
                                        instance = %watchdog.instance(),
                                        misses,
                                        "heartbeat lost; treating as unexpected exit"
                                    );
                                    session.terminate(false).await;
                                    watchdog.handle_exit(epoch).await;
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Stop initiated by a supervisor observing a pending soft shutdown.
    async fn stop_if_epoch(&self, epoch: u64) -> Result<(), Error> {
        {
            let state = self.inner.state.lock().await;
            match &*state {
                State::Online { epoch: current, .. } if *current == epoch => {}
                _ => return Ok(()),
            }
        }
        self.stop(true).await
    }

    /// A supervised session's process is gone. Decide between clean
    /// shutdown, relaunch, and giving up.
    async fn handle_exit(&self, epoch: u64) {
        let mut state = self.inner.state.lock().await;
        let State::Online { epoch: current, .. } = &*state else {
            return; // stale monitor
        };
        if *current != epoch {
            return;
        }
        let State::Online { session, .. } = std::mem::replace(&mut *state, State::Starting)
        else {
            unreachable!("matched Online above");
        };
        let reboot = session.reboot_state();
        let params = session_params(&session);
        drop(session); // release deployment and toolchain holds

        match reboot {
            RebootState::Shutdown => {
                info!(instance = %self.instance(), "session honoured soft shutdown");
                self.clear_reattach().await;
                self.publish(Event::WatchdogShutdown { instance: self.instance().clone() });
                self.transition(&mut state, State::Offline);
                return;
            }
            RebootState::Restart => {
                info!(instance = %self.instance(), "session exited for soft restart");
            }
            RebootState::Normal => {
                let attempts = self.inner.relaunches.fetch_add(1, Ordering::SeqCst) + 1;
                let relaunching = attempts <= MAX_RELAUNCHES;
                self.publish(Event::WatchdogCrashed {
                    instance: self.instance().clone(),
                    relaunching,
                });
                if !relaunching {
                    warn!(
                        instance = %self.instance(),
                        attempts,
                        "relaunch budget exhausted; going offline"
                    );
                    self.clear_reattach().await;
                    self.transition(&mut state, State::Offline);
                    return;
                }
                warn!(instance = %self.instance(), attempts, "unexpected exit; relaunching");
            }
        }

        let token = CancellationToken::new();
        match self.launch_session(&params, false, &token).await {
            Ok(new_session) => {
                let new_session = Arc::new(new_session);
                self.persist_reattach(&new_session).await;
                let epoch = self.next_epoch();
                self.spawn_supervisor(new_session.clone(), params, epoch);
                self.publish(Event::WatchdogLaunched {
                    instance: self.instance().clone(),
                    port: new_session.port(),
                });
                self.transition(&mut state, State::Online { session: new_session, epoch });
            }
            Err(e) => {
                warn!(instance = %self.instance(), error = %e, "relaunch failed; going offline");
                self.clear_reattach().await;
                self.transition(&mut state, State::Offline);
            }
        }
    }
}

/// Parameters the session was launched with.
fn session_params(session: &SessionController) -> LaunchParameters {
    session.launch_parameters().clone()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
