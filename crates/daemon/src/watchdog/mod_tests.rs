// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::deployment::DeploymentStore;
use crate::event_bus::EventBus;
use crate::storage::Store;
use crate::watchdog::test_helpers::{
    commit_fake_deployment, fake_toolchain, spawn_handshaker, test_instance_id, FakeTopicClient,
};
use gk_adapters::ProcessExecutor;
use tokio::sync::broadcast;

struct Fixture {
    _dir: tempfile::TempDir,
    watchdog: Watchdog,
    store: Arc<Store>,
    deployments: DeploymentStore,
    toolchain: crate::toolchain::ToolchainManager,
    registrar: BridgeRegistrar,
    topic: Arc<FakeTopicClient>,
    events: broadcast::Receiver<Event>,
    handshaker: Option<CancellationToken>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if let Some(token) = &self.handshaker {
            token.cancel();
        }
    }
}

/// Fixture with a fake toolchain and one committed deployment. When
/// `handshake` is set, a poller answers every launch's bridge handshake.
async fn fixture(run_secs: f32, handshake: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_toolchain(&dir.path().join("Toolchain"), run_secs);
    let deployments = DeploymentStore::new(dir.path().join("Game"));
    commit_fake_deployment(&deployments, 1).await;

    let store = Store::in_memory(dir.path().join("state.json"));
    let registrar = BridgeRegistrar::new();
    let topic = Arc::new(FakeTopicClient::default());
    let bus = EventBus::new();
    let instance = test_instance_id();
    let events = bus.subscribe(&instance);

    let watchdog = Watchdog::new(WatchdogDeps {
        instance: instance.clone(),
        session: SessionDeps {
            instance,
            executor: ProcessExecutor,
            registrar: registrar.clone(),
            topic: topic.clone(),
            bridge_port: 5580,
        },
        deployments: deployments.clone(),
        toolchain: toolchain.clone(),
        store: store.clone(),
        events: bus,
    });

    let handshaker = handshake.then(|| spawn_handshaker(registrar.clone()));
    Fixture {
        _dir: dir,
        watchdog,
        store,
        deployments,
        toolchain,
        registrar,
        topic,
        events,
        handshaker,
    }
}

fn params(startup_timeout_secs: u64) -> LaunchParameters {
    let primary = free_port();
    let mut secondary = free_port();
    while secondary == primary {
        secondary = free_port();
    }
    LaunchParameters {
        primary_port: primary,
        secondary_port: secondary,
        startup_timeout_secs,
        heartbeat_secs: 0,
        ..LaunchParameters::default()
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

async fn wait_status(watchdog: &Watchdog, status: WatchdogStatus, secs: u64) {
    let mut watch = watchdog.status_watch();
    tokio::time::timeout(Duration::from_secs(secs), watch.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("status never became {}", status))
        .unwrap();
}

#[tokio::test]
async fn start_without_deployment_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_toolchain(&dir.path().join("Toolchain"), 30.0);
    let deployments = DeploymentStore::new(dir.path().join("Game"));
    let store = Store::in_memory(dir.path().join("state.json"));
    let bus = EventBus::new();
    let instance = test_instance_id();
    let watchdog = Watchdog::new(WatchdogDeps {
        instance: instance.clone(),
        session: SessionDeps {
            instance,
            executor: ProcessExecutor,
            registrar: BridgeRegistrar::new(),
            topic: Arc::new(FakeTopicClient::default()),
            bridge_port: 5580,
        },
        deployments,
        toolchain,
        store,
        events: bus,
    });

    let err = watchdog
        .start(params(2), false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, Some(ErrorCode::DeploymentMissing));
    assert_eq!(watchdog.status(), WatchdogStatus::Offline);
}

#[tokio::test]
async fn start_reaches_online_and_persists_reattach() {
    let mut fx = fixture(30.0, true).await;
    let launch = params(5);
    fx.watchdog
        .start(launch.clone(), false, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fx.watchdog.status(), WatchdogStatus::Online);

    let report = fx.watchdog.report().await;
    assert!(report.running);
    assert_eq!(report.port, Some(launch.primary_port));
    assert_eq!(report.staged_deployment, None);

    let record = fx
        .store
        .with(|s| s.reattach.get(test_instance_id().as_str()).cloned())
        .expect("reattach record persisted");
    assert_eq!(record.port, launch.primary_port);

    let events = drain(&mut fx.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::WatchdogLaunched { .. })));

    fx.watchdog.stop(false).await.unwrap();
    assert_eq!(fx.watchdog.status(), WatchdogStatus::Offline);
    assert!(fx
        .store
        .with(|s| s.reattach.get(test_instance_id().as_str()).cloned())
        .is_none());
}

#[tokio::test]
async fn startup_timeout_aborts_to_offline() {
    let fx = fixture(30.0, false).await; // nobody answers the handshake
    let err = fx
        .watchdog
        .start(params(1), false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, gk_core::ErrorKind::Transient);
    assert_eq!(fx.watchdog.status(), WatchdogStatus::Offline);
}

#[tokio::test]
async fn cancel_during_startup_returns_offline() {
    let fx = fixture(30.0, false).await;
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let err = fx.watchdog.start(params(10), false, &token).await.unwrap_err();
    assert_eq!(err.kind, gk_core::ErrorKind::Transient);
    assert_eq!(fx.watchdog.status(), WatchdogStatus::Offline);
}

#[tokio::test]
async fn unexpected_exit_relaunches_with_bounded_retries() {
    let mut fx = fixture(0.5, true).await; // process dies shortly after handshake
    fx.watchdog
        .start(params(5), false, &CancellationToken::new())
        .await
        .unwrap();

    // Every relaunch also dies; the budget runs out and the watchdog
    // lands offline.
    wait_status(&fx.watchdog, WatchdogStatus::Offline, 30).await;

    let crashes: Vec<_> = drain(&mut fx.events)
        .into_iter()
        .filter_map(|e| match e {
            Event::WatchdogCrashed { relaunching, .. } => Some(relaunching),
            _ => None,
        })
        .collect();
    assert_eq!(crashes.len() as u32, MAX_RELAUNCHES + 1);
    assert!(crashes[..crashes.len() - 1].iter().all(|r| *r));
    assert!(!crashes[crashes.len() - 1]);
}

#[tokio::test]
async fn zero_downtime_swap_promotes_staged_deployment() {
    let mut fx = fixture(30.0, true).await;
    let launch = params(2);
    fx.watchdog
        .start(launch.clone(), false, &CancellationToken::new())
        .await
        .unwrap();
    let first = fx.watchdog.report().await;
    let d1 = first.active_deployment.clone().unwrap();

    // Publish a second deployment and swap onto it.
    let d2 = commit_fake_deployment(&fx.deployments, 2).await;
    fx.watchdog
        .swap_to_latest(&CancellationToken::new())
        .await
        .unwrap();

    let report = fx.watchdog.report().await;
    assert_eq!(report.status, WatchdogStatus::Online);
    assert!(report.running);
    assert_eq!(report.active_deployment, Some(d2.id.clone()));
    assert_eq!(report.staged_deployment, None);
    assert_ne!(report.active_deployment, Some(d1));
    // The staged session came up on the other port.
    assert_eq!(report.port, Some(launch.secondary_port));

    fx.watchdog.stop(false).await.unwrap();
}

#[tokio::test]
async fn soft_shutdown_takes_effect_at_natural_reboot() {
    let mut fx = fixture(30.0, true).await;
    fx.watchdog
        .start(params(5), false, &CancellationToken::new())
        .await
        .unwrap();
    fx.watchdog.soft_shutdown().await.unwrap();
    assert_eq!(fx.watchdog.report().await.reboot_state, RebootState::Shutdown);

    // The server reaches its natural reboot point.
    let access = fx.registrar.identifiers().pop().unwrap();
    fx.registrar.dispatch(&access, BridgeRequest::Reboot).unwrap();

    wait_status(&fx.watchdog, WatchdogStatus::Offline, 15).await;
    let events = drain(&mut fx.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::WatchdogShutdown { .. })));
}

#[tokio::test]
async fn heartbeat_misses_count_as_unexpected_exit() {
    let mut fx = fixture(30.0, true).await;
    let mut launch = params(5);
    launch.heartbeat_secs = 1;
    fx.watchdog
        .start(launch, false, &CancellationToken::new())
        .await
        .unwrap();

    fx.topic.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    // Three consecutive misses terminate and relaunch the session.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let crashed = drain(&mut fx.events)
            .iter()
            .any(|e| matches!(e, Event::WatchdogCrashed { .. }));
        if crashed {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no crash observed");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    fx.topic.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    let _ = fx.watchdog.stop(false).await;
}

#[tokio::test]
async fn reattach_restores_a_running_session() {
    let fx = fixture(30.0, true).await;
    let launch = params(5);
    fx.watchdog.start(launch.clone(), false, &CancellationToken::new()).await.unwrap();
    let pid = fx
        .store
        .with(|s| s.reattach.get(test_instance_id().as_str()).cloned())
        .unwrap()
        .pid;

    // Controller shutdown: supervision released, process left running.
    fx.watchdog.release().await;
    assert!(ProcessExecutor.pid_alive(pid));

    // A second watchdog over the same persisted state simulates the
    // restarted controller; the game process is still running.
    let registrar = BridgeRegistrar::new();
    let bus = EventBus::new();
    let instance = test_instance_id();
    let successor = Watchdog::new(WatchdogDeps {
        instance: instance.clone(),
        session: SessionDeps {
            instance,
            executor: ProcessExecutor,
            registrar,
            topic: Arc::new(FakeTopicClient::default()),
            bridge_port: 5580,
        },
        deployments: fx.deployments.clone(),
        toolchain: fx.toolchain.clone(),
        store: fx.store.clone(),
        events: bus,
    });

    let rebound = successor.reattach(launch.clone()).await.unwrap();
    assert!(rebound);
    assert_eq!(successor.status(), WatchdogStatus::Online);
    let report = successor.report().await;
    assert!(report.running);
    assert_eq!(report.port, Some(launch.primary_port));

    successor.stop(false).await.unwrap();
    assert_eq!(successor.status(), WatchdogStatus::Offline);
}

#[tokio::test]
async fn reattach_with_dead_pid_clears_record() {
    let fx = fixture(30.0, false).await;
    let deployment = fx.deployments.latest().unwrap();
    let record = gk_core::ReattachRecord {
        instance: test_instance_id(),
        pid: u32::MAX - 1,
        access_identifier: "deadbeef".repeat(4),
        port: 1337,
        primary_dir: true,
        deployment: deployment.id,
        reboot_state: RebootState::Normal,
        security_level: SecurityLevel::Safe,
    };
    fx.store
        .mutate(|s| {
            s.reattach.insert(test_instance_id().to_string(), record);
        })
        .await
        .unwrap();

    let rebound = fx.watchdog.reattach(params(2)).await.unwrap();
    assert!(!rebound);
    assert_eq!(fx.watchdog.status(), WatchdogStatus::Offline);
    assert!(fx
        .store
        .with(|s| s.reattach.get(test_instance_id().as_str()).cloned())
        .is_none());
}
